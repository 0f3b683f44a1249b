pub mod inspect;
pub mod manifest;
pub mod run;
