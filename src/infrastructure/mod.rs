pub mod helm_charts;
