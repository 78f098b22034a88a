pub mod preprocess;
pub mod demux;
pub mod split;
