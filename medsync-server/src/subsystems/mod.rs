pub mod advice;
pub mod consultation;
pub mod dashboard;
pub mod marketplace;
