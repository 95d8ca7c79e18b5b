use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub customer_email: String,
    pub customer_name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub balance: Decimal,
}

/// Answer to `GET /accounts/{email}/check?amount=`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceCheck {
    pub email: String,
    pub customer_name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub balance: Decimal,
    pub sufficient: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BalanceQuery {
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
}

/// Body of `POST /accounts/{email}/debit`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebitRequest {
    pub email: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub order_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebitReceipt {
    pub email: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub new_balance: Decimal,
    pub order_id: Uuid,
    pub success: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_debit_request_uses_camel_case_numbers() {
        let order_id = Uuid::new_v4();
        let json = serde_json::json!({
            "email": "alice@example.com",
            "amount": 45.5,
            "orderId": order_id,
        });

        let request: DebitRequest = serde_json::from_value(json).unwrap();
        assert_eq!(request.amount, Decimal::new(455, 1));
        assert_eq!(request.order_id, order_id);
    }

    #[test]
    fn test_balance_check_wire_shape() {
        let check = BalanceCheck {
            email: "alice@example.com".to_string(),
            customer_name: "Alice".to_string(),
            balance: Decimal::new(500, 0),
            sufficient: true,
        };

        let value = serde_json::to_value(&check).unwrap();
        assert_eq!(value["customerName"], "Alice");
        assert_eq!(value["balance"], 500.0);
        assert_eq!(value["sufficient"], true);
    }
}
