pub mod attempt;
pub mod contact;
pub mod event;
pub mod outcome;
pub mod score;
