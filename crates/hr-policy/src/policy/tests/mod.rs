mod common;

mod functional_area;
mod registry;
mod rules;
