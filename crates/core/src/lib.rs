pub mod class;
pub mod error;
pub mod field_value;
pub mod grade;
pub mod ids;
pub mod rubric;
pub mod scale;
pub mod semester;

pub use class::{Class, ClassType, Color};
pub use error::CoreError;
pub use field_value::FieldValue;
pub use grade::{Grade, Percentage};
pub use ids::*;
pub use rubric::{Assignment, Rubric};
pub use scale::{GradePercentage, GradeScale, ScaleType};
pub use semester::Semester;
