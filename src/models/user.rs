use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub email_confirmed: bool,
    #[serde(skip)]
    pub access_token: Option<String>,
}

pub const DEV_USER_ID: &str = "dev-user-id";

impl User {
    /// Fixed identity used when running in development without credentials.
    pub fn dev() -> Self {
        User {
            id: DEV_USER_ID.to_string(),
            first_name: "Dev".to_string(),
            last_name: "User".to_string(),
            email: "dev@example.com".to_string(),
            email_confirmed: true,
            access_token: None,
        }
    }
}
