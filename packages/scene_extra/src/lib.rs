pub mod scene_graph;
pub mod host;
pub mod state;
pub mod fault;
pub mod notifier;
pub mod load_gate;
pub mod animation;
pub mod input;
pub mod assets;
pub mod config;

// Tag replacement and the controller
pub mod extra_object;
pub mod tag_search;
pub mod replace;
pub mod controller;
pub mod objects;

// Cloud data bindings
pub mod data;
pub mod rules;

pub mod headless;
pub mod relay;
pub mod cli;
