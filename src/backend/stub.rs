//! Handle types used when the crate is built without a physics backend.
//!
//! They have no values, so settings can still name them while every slot
//! holding one stays `None`.

#[derive(Debug)]
pub enum WorldHandle {}

#[derive(Debug)]
pub enum BodyHandle {}

#[derive(Debug)]
pub enum ShapeHandle {}

#[derive(Debug)]
pub enum ConstraintHandle {}
