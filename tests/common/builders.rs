use form_sentinel::page::extractor::PageSnapshotExtractor;
use form_sentinel::page::page_model::{ComputedStyle, PageSnapshot, RawElement, RawForm, RawPage, Rect};

pub const PAGE_URL: &str = "https://shop.example/register";

pub fn on_screen() -> Rect {
    Rect {
        x: 120.0,
        y: 200.0,
        width: 240.0,
        height: 32.0,
    }
}

/// A visible input inside form 0.
pub fn input(name: &str, input_type: &str) -> RawElement {
    RawElement {
        tag: "input".into(),
        input_type: Some(input_type.into()),
        name: Some(name.into()),
        form_index: Some(0),
        rect: on_screen(),
        ..Default::default()
    }
}

pub fn button(text: &str, button_type: &str) -> RawElement {
    RawElement {
        tag: "button".into(),
        input_type: Some(button_type.into()),
        text: Some(text.into()),
        form_index: Some(0),
        rect: on_screen(),
        ..Default::default()
    }
}

pub fn checkbox(name: &str, label: &str) -> RawElement {
    RawElement {
        labels: vec![label.into()],
        ..input(name, "checkbox")
    }
}

pub fn with_attr(mut el: RawElement, key: &str, value: &str) -> RawElement {
    el.attributes.insert(key.into(), value.into());
    el
}

pub fn with_placeholder(el: RawElement, placeholder: &str) -> RawElement {
    with_attr(el, "placeholder", placeholder)
}

pub fn with_id(mut el: RawElement, id: &str) -> RawElement {
    el.id = Some(id.into());
    el
}

pub fn with_class(mut el: RawElement, class: &str) -> RawElement {
    el.class_name = Some(class.into());
    el
}

pub fn with_label(mut el: RawElement, label: &str) -> RawElement {
    el.labels.push(label.into());
    el
}

pub fn display_none(mut el: RawElement) -> RawElement {
    el.style = ComputedStyle {
        display: Some("none".into()),
        ..Default::default()
    };
    el.rect = Rect::default();
    el
}

pub fn visibility_hidden(mut el: RawElement) -> RawElement {
    el.style = ComputedStyle {
        visibility: Some("hidden".into()),
        ..Default::default()
    };
    el
}

pub fn offscreen(mut el: RawElement) -> RawElement {
    el.style.position = Some("absolute".into());
    el.rect = Rect {
        x: -9999.0,
        y: 200.0,
        width: 200.0,
        height: 30.0,
    };
    el
}

pub fn signup_form() -> RawForm {
    RawForm {
        index: 0,
        id: Some("signup".into()),
        name: None,
        action: Some("/register".into()),
        method: Some("post".into()),
        html: r#"<form id="signup" action="/register" method="post"></form>"#.into(),
    }
}

pub fn raw_page(elements: &[RawElement]) -> RawPage {
    RawPage {
        url: PAGE_URL.into(),
        title: "Create your account".into(),
        html: String::new(),
        forms: vec![signup_form()],
        elements: elements
            .iter()
            .map(|e| serde_json::to_value(e).unwrap())
            .collect(),
        ..Default::default()
    }
}

pub fn snapshot(elements: &[RawElement]) -> PageSnapshot {
    PageSnapshotExtractor::default().from_raw(raw_page(elements))
}

/// A typical registration form with one display:none trap.
pub fn registration_elements() -> Vec<RawElement> {
    vec![
        with_label(input("first_name", "text"), "First name"),
        with_label(input("last_name", "text"), "Last name"),
        with_placeholder(input("email", "email"), "you@example.com"),
        display_none(input("website", "text")),
        with_label(input("password", "password"), "Password"),
        with_label(input("password_confirmation", "password"), "Confirm password"),
        checkbox("accept_terms", "I agree to the Terms of Service"),
        checkbox("newsletter", "Send me the newsletter"),
        button("Create account", "submit"),
    ]
}

