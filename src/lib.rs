pub mod bot;
pub mod common;
pub mod configs;
pub mod gateway;
pub mod rest;
pub mod tracker;
pub mod transport;
