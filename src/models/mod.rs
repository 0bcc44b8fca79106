pub mod modernbert;
