pub mod ml_model;
