pub mod auth_form;
pub mod conversation;

pub use auth_form::{AuthForm, AuthFormResult, AuthMode};
