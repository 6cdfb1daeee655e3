//! Subscription tiers and the pricing catalogue.
//!
//! The tier is stored on the profile under the `package` key. Prices are kept
//! in cents to avoid float rounding when comparing billing cycles.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    #[default]
    #[serde(alias = "basic")]
    Basic,
    #[serde(alias = "standard")]
    Standard,
    #[serde(alias = "premium")]
    Premium,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingCycle {
    Monthly,
    Yearly,
}

#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    pub tier: Tier,
    pub name: &'static str,
    pub description: &'static str,
    pub monthly_price_cents: u32,
    pub yearly_price_cents: u32,
    /// `None` means unlimited.
    pub ats_checks_per_month: Option<u32>,
    pub popular: bool,
}

static CATALOGUE: [Plan; 3] = [
    Plan {
        tier: Tier::Basic,
        name: "Basic",
        description: "Perfect for getting started",
        monthly_price_cents: 0,
        yearly_price_cents: 0,
        ats_checks_per_month: Some(5),
        popular: false,
    },
    Plan {
        tier: Tier::Standard,
        name: "Standard",
        description: "For serious job seekers",
        monthly_price_cents: 999,
        yearly_price_cents: 9999,
        ats_checks_per_month: None,
        popular: true,
    },
    Plan {
        tier: Tier::Premium,
        name: "Premium",
        description: "Complete career transformation",
        monthly_price_cents: 1999,
        yearly_price_cents: 19999,
        ats_checks_per_month: None,
        popular: false,
    },
];

pub fn catalogue() -> &'static [Plan] {
    &CATALOGUE
}

impl Tier {
    pub fn plan(self) -> &'static Plan {
        match self {
            Tier::Basic => &CATALOGUE[0],
            Tier::Standard => &CATALOGUE[1],
            Tier::Premium => &CATALOGUE[2],
        }
    }
}

impl Plan {
    pub fn price_cents(&self, cycle: BillingCycle) -> u32 {
        match cycle {
            BillingCycle::Monthly => self.monthly_price_cents,
            BillingCycle::Yearly => self.yearly_price_cents,
        }
    }

    /// What a yearly subscription saves over twelve monthly payments.
    pub fn yearly_savings_cents(&self) -> u32 {
        (self.monthly_price_cents * 12).saturating_sub(self.yearly_price_cents)
    }
}

/// Formats cents as a dollar amount, e.g. `999` → `"$9.99"`.
pub fn format_price(cents: u32) -> String {
    format!("${}.{:02}", cents / 100, cents % 100)
}
