pub mod signup;
pub mod tokens;

pub use signup::{
    hash_password, routes, sessions_middleware, staff_required_middleware, verify_password,
};
pub use tokens::{decode_uid, encode_uid, ActivationTokens};
