pub mod add;
pub mod r#do;
pub mod list;
pub mod recur;
pub mod undo;
