//! Primary course catalog and its filter

pub mod course;
pub mod filter;

pub use course::{Course, Lesson};
pub use filter::{
    CompletionStatus, DateFilter, Designation, FilterEngine, FilterState, RatingFilter,
    ALL_CATEGORIES,
};
