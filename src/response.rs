use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }

    pub fn registered() -> Self {
        Self::new("Registration successful. Check your email for the confirmation code.")
    }

    pub fn confirmed() -> Self {
        Self::new("User confirmed and activated")
    }

    pub fn logged_in() -> Self {
        Self::new("Login successful")
    }
}
