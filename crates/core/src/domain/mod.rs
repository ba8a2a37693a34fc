pub mod price_update;
pub mod product;
