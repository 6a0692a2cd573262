pub mod electrofill;
