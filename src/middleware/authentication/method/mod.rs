mod f_dev;
mod f_oauth;

pub use f_dev::try_dev;
pub use f_oauth::{try_oauth, OAuthCache};
