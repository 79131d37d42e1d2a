use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The semantic role a form control plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldPurpose {
    Email,
    ConfirmEmail,
    Password,
    ConfirmPassword,
    FirstName,
    LastName,
    FullName,
    Phone,
    Company,
    Address,
    Age,
    Gender,
    Terms,
    Privacy,
    Newsletter,
    Marketing,
    /// The form's submit control. Never assigned to a fillable field.
    Submit,
    Other,
}

impl FieldPurpose {
    pub const ALL: [FieldPurpose; 18] = [
        FieldPurpose::Email,
        FieldPurpose::ConfirmEmail,
        FieldPurpose::Password,
        FieldPurpose::ConfirmPassword,
        FieldPurpose::FirstName,
        FieldPurpose::LastName,
        FieldPurpose::FullName,
        FieldPurpose::Phone,
        FieldPurpose::Company,
        FieldPurpose::Address,
        FieldPurpose::Age,
        FieldPurpose::Gender,
        FieldPurpose::Terms,
        FieldPurpose::Privacy,
        FieldPurpose::Newsletter,
        FieldPurpose::Marketing,
        FieldPurpose::Submit,
        FieldPurpose::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldPurpose::Email => "email",
            FieldPurpose::ConfirmEmail => "confirmEmail",
            FieldPurpose::Password => "password",
            FieldPurpose::ConfirmPassword => "confirmPassword",
            FieldPurpose::FirstName => "firstName",
            FieldPurpose::LastName => "lastName",
            FieldPurpose::FullName => "fullName",
            FieldPurpose::Phone => "phone",
            FieldPurpose::Company => "company",
            FieldPurpose::Address => "address",
            FieldPurpose::Age => "age",
            FieldPurpose::Gender => "gender",
            FieldPurpose::Terms => "terms",
            FieldPurpose::Privacy => "privacy",
            FieldPurpose::Newsletter => "newsletter",
            FieldPurpose::Marketing => "marketing",
            FieldPurpose::Submit => "submit",
            FieldPurpose::Other => "other",
        }
    }

    /// Consent-style purposes that are ticked rather than typed into.
    pub fn is_checkbox(&self) -> bool {
        matches!(
            self,
            FieldPurpose::Terms
                | FieldPurpose::Privacy
                | FieldPurpose::Newsletter
                | FieldPurpose::Marketing
        )
    }

    /// Purposes that receive typed or selected values.
    pub fn is_fillable(&self) -> bool {
        !self.is_checkbox() && !matches!(self, FieldPurpose::Submit | FieldPurpose::Other)
    }
}

impl fmt::Display for FieldPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldPurpose {
    type Err = String;

    /// Accepts camelCase, snake_case and a few common synonyms, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect::<String>()
            .to_lowercase();

        let purpose = match key.as_str() {
            "email" | "emailaddress" | "mail" => FieldPurpose::Email,
            "confirmemail" | "emailconfirm" | "emailconfirmation" | "repeatemail" => {
                FieldPurpose::ConfirmEmail
            }
            "password" | "pass" | "pwd" => FieldPurpose::Password,
            "confirmpassword" | "passwordconfirm" | "passwordconfirmation" | "repeatpassword" => {
                FieldPurpose::ConfirmPassword
            }
            "firstname" | "givenname" | "fname" => FieldPurpose::FirstName,
            "lastname" | "surname" | "familyname" | "lname" => FieldPurpose::LastName,
            "fullname" | "name" => FieldPurpose::FullName,
            "phone" | "tel" | "telephone" | "mobile" => FieldPurpose::Phone,
            "company" | "organization" | "organisation" => FieldPurpose::Company,
            "address" | "street" => FieldPurpose::Address,
            "age" => FieldPurpose::Age,
            "gender" | "sex" => FieldPurpose::Gender,
            "terms" | "tos" | "termsofservice" => FieldPurpose::Terms,
            "privacy" | "privacypolicy" => FieldPurpose::Privacy,
            "newsletter" => FieldPurpose::Newsletter,
            "marketing" => FieldPurpose::Marketing,
            "submit" | "submitbutton" => FieldPurpose::Submit,
            "other" => FieldPurpose::Other,
            _ => return Err(format!("unknown field purpose '{}'", s)),
        };
        Ok(purpose)
    }
}

/// Where a purpose assignment came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GuessSource {
    Pattern,
    External,
}

/// One ranked purpose assignment for a snapshot element.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurposeGuess {
    pub element_ref: usize,
    pub purpose: FieldPurpose,
    pub confidence: f32,
    pub source: GuessSource,
    pub evidence: String,
}
