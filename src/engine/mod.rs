pub mod evaluator;
pub mod operators;
pub mod physics;
pub mod surrogate;
