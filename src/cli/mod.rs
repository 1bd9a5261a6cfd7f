pub mod doctor;
pub mod inspect;
pub mod purge;
pub mod reset;
