// Data models for the backend API and the request pipeline

pub mod auth;
pub mod request;

pub use auth::{ChangePasswordRequest, LoginRequest, RefreshRequest, TokenResponse, UserProfile};
pub use request::{ApiRequest, FormData, FormPart, Payload, RequestBody};
