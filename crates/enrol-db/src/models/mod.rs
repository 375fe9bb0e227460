//! Domain records stored by the directory and the token store.

pub mod access_token;
pub mod user;

pub use access_token::{
    AccessToken, Guard, NewAccessToken, Superseded, TokenPurpose, TokenState, TokenStatus,
    Transition, TransitionRejected,
};
pub use user::{NewUser, UserMetadata, UserRecord, UserStatus};
