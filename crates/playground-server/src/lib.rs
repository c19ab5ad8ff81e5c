//! REST API server: routes, GitHub login, DTOs, and OpenAPI documentation.

pub mod auth;
pub mod config;
pub mod dto;
pub mod error;
pub mod oauth;
pub mod openapi;
pub mod routes;
pub mod state;
pub mod web;
