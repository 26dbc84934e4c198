pub mod all_models;
