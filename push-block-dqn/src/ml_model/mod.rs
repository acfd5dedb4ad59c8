pub mod burn_model;
