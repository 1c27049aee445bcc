use crate::models;
use serde::{Deserialize, Serialize};
use serde_valid::Validate;

/// Response of the identity service behind `auth_url`.
#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserForm {
    pub user: User,
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct User {
    #[serde(rename = "_id")]
    #[validate(min_length = 1)]
    pub id: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub email_confirmed: bool,
}

impl TryInto<models::User> for UserForm {
    type Error = String;

    fn try_into(self) -> Result<models::User, Self::Error> {
        self.user
            .validate()
            .map_err(|err| format!("invalid user payload: {err}"))?;

        Ok(models::User {
            id: self.user.id,
            first_name: self.user.first_name,
            last_name: self.user.last_name,
            email: self.user.email,
            email_confirmed: self.user.email_confirmed,
            access_token: None,
        })
    }
}
