pub mod object_handlers;
pub mod pages;
