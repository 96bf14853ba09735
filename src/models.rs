use serde::{Deserialize, Serialize};

// Register / login request body
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

// Issued access token
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64, // seconds
}

// Envelope for successful responses
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data,
        }
    }
}
