//! HTTP handlers. Thin glue over the prediction and task modules; all
//! real work lives there.

pub mod health;
pub mod jobs;
pub mod predict;
pub mod status;
