pub mod a001_tour;
