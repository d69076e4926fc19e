pub mod boxplot;
pub mod frequency;
pub mod report;
pub mod response;
pub mod significance;
pub mod subset;
pub mod summary;
