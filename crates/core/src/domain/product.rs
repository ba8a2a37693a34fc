use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use unicode_properties::{GeneralCategory, UnicodeGeneralCategory};

use crate::errors::ValidationError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub i64);

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub stock_quantity: i32,
    pub price: Decimal,
}

/// A product that passed creation validation and has not been stored yet.
///
/// The only way to obtain one is [`NewProduct::try_new`], so every record that
/// reaches the store satisfies the creation invariant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewProduct {
    name: String,
    stock_quantity: i32,
    price: Decimal,
}

impl NewProduct {
    pub fn try_new(
        name: impl Into<String>,
        stock_quantity: i32,
        price: Decimal,
    ) -> Result<Self, ValidationError> {
        let name = name.into();
        validate_name(&name)?;
        if stock_quantity <= 0 || price <= Decimal::ZERO {
            return Err(ValidationError::NonPositiveStockOrPrice);
        }

        Ok(Self { name, stock_quantity, price })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stock_quantity(&self) -> i32 {
        self.stock_quantity
    }

    pub fn price(&self) -> Decimal {
        self.price
    }

    pub fn into_product(self, id: ProductId) -> Product {
        Product { id, name: self.name, stock_quantity: self.stock_quantity, price: self.price }
    }
}

/// Names must be non-empty and free of decimal digits. Non-ASCII digits such
/// as `٣` count; other numeric characters (`Ⅻ`, `²`, `½`) do not.
pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() || name.chars().any(is_decimal_digit) {
        return Err(ValidationError::InvalidName);
    }
    Ok(())
}

fn is_decimal_digit(character: char) -> bool {
    character.general_category() == GeneralCategory::DecimalNumber
}

pub fn validate_price(price: Decimal) -> Result<(), ValidationError> {
    if price <= Decimal::ZERO {
        return Err(ValidationError::NonPositivePrice);
    }
    Ok(())
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProductFilter {
    pub min_stock_quantity: Option<i32>,
    pub min_price: Option<Decimal>,
}

impl ProductFilter {
    pub fn is_unbounded(&self) -> bool {
        self.min_stock_quantity.is_none() && self.min_price.is_none()
    }

    pub fn matches(&self, product: &Product) -> bool {
        let stock_ok =
            self.min_stock_quantity.map_or(true, |minimum| product.stock_quantity >= minimum);
        let price_ok = self.min_price.map_or(true, |minimum| product.price >= minimum);
        stock_ok && price_ok
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{validate_price, NewProduct, Product, ProductFilter, ProductId};
    use crate::errors::ValidationError;

    fn product(stock_quantity: i32, price: Decimal) -> Product {
        Product { id: ProductId(1), name: "Widget".to_string(), stock_quantity, price }
    }

    #[test]
    fn accepts_valid_product() {
        let new_product =
            NewProduct::try_new("Widget", 3, Decimal::new(1999, 2)).expect("valid product");

        assert_eq!(new_product.name(), "Widget");
        assert_eq!(new_product.stock_quantity(), 3);
        assert_eq!(new_product.price(), Decimal::new(1999, 2));
    }

    #[test]
    fn rejects_empty_or_digit_names() {
        for name in ["", "Widget 2000", "7up", "٣", "Model ７"] {
            let result = NewProduct::try_new(name, 1, Decimal::ONE);
            assert_eq!(result, Err(ValidationError::InvalidName), "name `{name}` should fail");
        }
    }

    #[test]
    fn non_decimal_numerals_are_allowed_in_names() {
        for name in ["Ⅻ", "m²", "Chapter Ⅻ", "Tile m²", "Half ½"] {
            let new_product = NewProduct::try_new(name, 1, Decimal::ONE)
                .unwrap_or_else(|error| panic!("name `{name}` should pass: {error}"));
            assert_eq!(new_product.name(), name);
        }
    }

    #[test]
    fn name_is_checked_before_quantities() {
        let result = NewProduct::try_new("R2D2", 0, Decimal::ZERO);
        assert_eq!(result, Err(ValidationError::InvalidName));
    }

    #[test]
    fn rejects_non_positive_stock_or_price() {
        let cases = [(0, Decimal::ONE), (-4, Decimal::ONE), (1, Decimal::ZERO), (1, Decimal::NEGATIVE_ONE)];
        for (stock_quantity, price) in cases {
            let result = NewProduct::try_new("Widget", stock_quantity, price);
            assert_eq!(result, Err(ValidationError::NonPositiveStockOrPrice));
        }
    }

    #[test]
    fn validation_messages_match_client_contract() {
        assert_eq!(ValidationError::InvalidName.to_string(), "Product name cannot contain numbers.");
        assert_eq!(
            ValidationError::NonPositiveStockOrPrice.to_string(),
            "Stock quantity and price must be greater than zero."
        );
        assert_eq!(ValidationError::NonPositivePrice.to_string(), "Price must be greater than zero.");
    }

    #[test]
    fn price_validation_requires_positive_value() {
        assert!(validate_price(Decimal::new(1, 2)).is_ok());
        assert_eq!(validate_price(Decimal::ZERO), Err(ValidationError::NonPositivePrice));
    }

    #[test]
    fn filter_bounds_are_inclusive_and_conjunctive() {
        let filter = ProductFilter { min_stock_quantity: Some(5), min_price: Some(Decimal::TEN) };

        assert!(filter.matches(&product(5, Decimal::TEN)));
        assert!(!filter.matches(&product(4, Decimal::ONE_HUNDRED)));
        assert!(!filter.matches(&product(50, Decimal::new(999, 2))));
    }

    #[test]
    fn empty_filter_matches_everything() {
        let filter = ProductFilter::default();

        assert!(filter.is_unbounded());
        assert!(filter.matches(&product(1, Decimal::new(1, 2))));
    }

    #[test]
    fn product_serializes_with_camel_case_fields() {
        let json = serde_json::to_value(product(7, Decimal::new(1250, 2))).expect("serialize");

        assert_eq!(json["id"], 1);
        assert_eq!(json["stockQuantity"], 7);
        assert_eq!(json["price"], "12.50");
    }
}
