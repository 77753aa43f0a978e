#![allow(dead_code)]

pub mod api;
pub mod connector;
pub mod source;
