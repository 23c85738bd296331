pub mod collocation;
