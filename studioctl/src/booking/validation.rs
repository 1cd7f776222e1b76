//! Credit validation rules.
//!
//! Pure functions over class configuration and, optionally, a snapshot of the user's ledger.
//! Nothing here touches the database; the lifecycle manager re-checks balances under lock.

use serde::Serialize;

use crate::db::models::{
    classes::{Class, ClassCategory},
    credits::{CreditGroup, SubscriptionCredit},
};
use crate::errors::{Error, Result};

/// Outcome of [`validate_credit_usage`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreditValidation {
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub allowed_credit_types: Vec<CreditGroup>,
    pub required_credits: i32,
}

impl CreditValidation {
    fn valid(allowed_credit_types: Vec<CreditGroup>, required_credits: i32) -> Self {
        Self {
            is_valid: true,
            error_message: None,
            allowed_credit_types,
            required_credits,
        }
    }

    fn invalid(message: impl Into<String>, allowed_credit_types: Vec<CreditGroup>) -> Self {
        Self {
            is_valid: false,
            error_message: Some(message.into()),
            allowed_credit_types,
            required_credits: 1,
        }
    }

    /// Convert into a service result, surfacing the message as a validation error
    pub fn into_result(self) -> Result<Self> {
        if self.is_valid {
            Ok(self)
        } else {
            let message = self.error_message.clone().unwrap_or_else(|| "Invalid credit usage".to_string());
            Err(Error::bad_request(message))
        }
    }
}

/// Display entry for one credit type a class may be paid with
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreditTypeInfo {
    #[serde(rename = "type")]
    pub credit_type: CreditGroup,
    pub label: String,
    pub available: bool,
    /// Credits granted per purchase of the class in this group
    pub credits: i32,
}

/// Credit groups a class can be paid with.
///
/// `group` needs a group-capable subscription class that grants group credits; `private` needs a
/// private-capable private class that grants private credits.
pub fn allowed_credit_types(class: &Class) -> Vec<CreditGroup> {
    let mut allowed = Vec::with_capacity(2);
    if class.class_type.allows_group() && class.category == ClassCategory::Subscription && class.group_credits > 0 {
        allowed.push(CreditGroup::Group);
    }
    if class.class_type.allows_private() && class.category == ClassCategory::Private && class.private_credits > 0 {
        allowed.push(CreditGroup::Private);
    }
    allowed
}

/// Re-confirm that a credit group pairs with the class category on its own terms.
pub fn validate_class_category_compatibility(category: &ClassCategory, credit_type: CreditGroup) -> Result<()> {
    match (credit_type, category) {
        (CreditGroup::Group, ClassCategory::Subscription) | (CreditGroup::Private, ClassCategory::Private) => Ok(()),
        (CreditGroup::Group, _) => Err(Error::bad_request(format!(
            "Group credits can only be used for subscription classes, not '{category}'"
        ))),
        (CreditGroup::Private, _) => Err(Error::bad_request(format!(
            "Private credits can only be used for private classes, not '{category}'"
        ))),
        (CreditGroup::Zoom, _) => Err(Error::bad_request("Zoom credits cannot be used to book classes")),
    }
}

/// Check whether a booking may be paid with credits.
///
/// The balance check only runs when a non-empty snapshot is supplied. The purchase top-up path
/// deliberately passes `None`, since the credits it spends are granted by the same booking.
pub fn validate_credit_usage(
    class: &Class,
    used_credit: bool,
    credit_type: Option<CreditGroup>,
    user_credits: Option<&[SubscriptionCredit]>,
) -> CreditValidation {
    let allowed = allowed_credit_types(class);

    if !used_credit {
        return CreditValidation::valid(allowed, 0);
    }

    let Some(credit_type) = credit_type else {
        return CreditValidation::invalid("A credit type is required when paying with credits", allowed);
    };

    if !allowed.contains(&credit_type) {
        let message = if allowed.is_empty() {
            format!("This class cannot be booked with {credit_type} credits; it does not accept credits")
        } else {
            let names: Vec<&str> = allowed.iter().map(CreditGroup::as_str).collect();
            format!(
                "This class cannot be booked with {credit_type} credits; allowed credit types: {}",
                names.join(", ")
            )
        };
        return CreditValidation::invalid(message, allowed);
    }

    if let Err(err) = validate_class_category_compatibility(&class.category, credit_type) {
        return CreditValidation::invalid(err.user_message(), allowed);
    }

    if let Some(credits) = user_credits.filter(|credits| !credits.is_empty()) {
        let has_balance = credits
            .iter()
            .any(|credit| credit.credit_group == credit_type && credit.remaining_credits > 0);
        if !has_balance {
            return CreditValidation::invalid(format!("You do not have any {credit_type} credits left"), allowed);
        }
    }

    CreditValidation::valid(allowed, 1)
}

/// Both bookable credit groups with their availability for a class, for read-only clients
pub fn available_credit_types(class: &Class) -> Vec<CreditTypeInfo> {
    let allowed = allowed_credit_types(class);
    vec![
        CreditTypeInfo {
            credit_type: CreditGroup::Group,
            label: "Group class credits".to_string(),
            available: allowed.contains(&CreditGroup::Group),
            credits: class.group_credits,
        },
        CreditTypeInfo {
            credit_type: CreditGroup::Private,
            label: "Private session credits".to_string(),
            available: allowed.contains(&CreditGroup::Private),
            credits: class.private_credits,
        },
    ]
}
