//! Shared shapes for the FoodShare service: domain models as stored and
//! served, request/response bodies, and the validation boundary.

pub mod api;
pub mod models;
pub mod validate;
