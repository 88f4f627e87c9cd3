pub mod extractors;
pub mod token;

pub use extractors::BearerAuth;
pub use token::tokens_match;
