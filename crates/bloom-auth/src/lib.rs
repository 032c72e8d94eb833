pub mod otp;
pub mod tokens;
