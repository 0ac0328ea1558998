pub mod area;
pub mod cluster_detector;
pub mod enclosing_circle;
pub mod geometry;
pub mod point;
pub mod population;
pub mod sensor;
pub mod statistics;
