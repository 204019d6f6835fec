//! Crossing point fee configuration.
//!
//! [`CrossingPointRecord`] mirrors the loosely typed administrative document;
//! [`CrossingPoint`] is the strict form the fee rules work with. Conversion
//! happens once, at the store boundary.

use serde::{Deserialize, Serialize};
use tracing::warn;
use ts_rs::TS;
use utoipa::ToSchema;

use crate::models::{Coordinates, FerryPayer};
use crate::numeric::{NumericValue, numeric_or_zero};

/// A border crossing the business operates, with its fixed partner
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KnownCrossing {
    pub brazilian: &'static str,
    pub paraguayan: &'static str,
    pub brazil_coordinates: Coordinates,
    pub paraguay_coordinates: Coordinates,
}

pub const KNOWN_CROSSINGS: [KnownCrossing; 4] = [
    KnownCrossing {
        brazilian: "Guaíra",
        paraguayan: "Salto del Guaíra",
        brazil_coordinates: Coordinates::new(-24.0860, -54.2567),
        paraguay_coordinates: Coordinates::new(-24.0886, -54.3368),
    },
    KnownCrossing {
        brazilian: "Mundo Novo",
        paraguayan: "Salto del Guaíra",
        brazil_coordinates: Coordinates::new(-23.9421, -54.2805),
        paraguay_coordinates: Coordinates::new(-24.0886, -54.3368),
    },
    KnownCrossing {
        brazilian: "Foz do Iguaçu",
        paraguayan: "Ciudad del Este",
        brazil_coordinates: Coordinates::new(-25.5094, -54.5967),
        paraguay_coordinates: Coordinates::new(-25.5096, -54.6038),
    },
    KnownCrossing {
        brazilian: "Santa Helena",
        paraguayan: "Puerto Indio",
        brazil_coordinates: Coordinates::new(-24.869651, -54.352615),
        paraguay_coordinates: Coordinates::new(-24.921943, -54.477637),
    },
];

/// Case-insensitive, whitespace-tolerant name comparison
pub fn names_match(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

/// Look a crossing up by its Brazilian side name.
pub fn find_known_crossing(name: &str) -> Option<&'static KnownCrossing> {
    KNOWN_CROSSINGS.iter().find(|c| names_match(c.brazilian, name))
}

/// Who pays the ferry at a crossing point before any request override
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum FerryPayerPolicy {
    /// The operator always fronts the ferry
    Company,
    /// Follows the request's company-pays toggle
    User,
    Driver,
}

impl FerryPayerPolicy {
    /// Name-derived default: Santa Helena is always company-paid, Guaíra
    /// follows the user toggle, everything else is driver-paid.
    pub fn for_crossing(name: &str) -> Self {
        if names_match(name, "Santa Helena") {
            FerryPayerPolicy::Company
        } else if names_match(name, "Guaíra") {
            FerryPayerPolicy::User
        } else {
            FerryPayerPolicy::Driver
        }
    }

    /// Apply the request's toggle and its hard override.
    pub fn resolve(self, company_pays_toggle: bool, force_company: bool) -> FerryPayer {
        if force_company {
            return FerryPayer::Company;
        }
        match self {
            FerryPayerPolicy::Company => FerryPayer::Company,
            FerryPayerPolicy::User if company_pays_toggle => FerryPayer::Company,
            FerryPayerPolicy::User | FerryPayerPolicy::Driver => FerryPayer::Driver,
        }
    }
}

// ---------------------------------------------------------------------------
// Raw administrative document
// ---------------------------------------------------------------------------

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BorderSide {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FafRecord {
    pub per_truck: Option<NumericValue>,
    pub lot1000: Option<NumericValue>,
    pub lot1500: Option<NumericValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerTonRecord {
    #[serde(default)]
    pub enabled: bool,
    pub cost_per_ton: Option<NumericValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerTruckRecord {
    #[serde(default)]
    pub enabled: bool,
    pub cost_per_truck: Option<NumericValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapaRecord {
    pub cost_per_ton: Option<NumericValue>,
    pub acerto: Option<NumericValue>,
    pub fixo: Option<NumericValue>,
    pub lot1000: Option<NumericValue>,
    pub lot1500: Option<NumericValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalsaRecord {
    #[serde(default)]
    pub enabled: bool,
    pub default_cost: Option<NumericValue>,
    pub puerto_indio_cost: Option<NumericValue>,
    /// Overrides the name-derived payer policy when present
    pub payer: Option<FerryPayerPolicy>,
}

/// Crossing point configuration exactly as the store holds it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossingPointRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub brazilian_side: BorderSide,
    #[serde(default)]
    pub paraguayan_side: BorderSide,
    #[serde(default)]
    pub faf: FafRecord,
    #[serde(default)]
    pub fula: PerTonRecord,
    #[serde(default)]
    pub mapa: MapaRecord,
    #[serde(default)]
    pub balsa: BalsaRecord,
    #[serde(default)]
    pub estacionamento: PerTruckRecord,
    #[serde(default)]
    pub dinatran: PerTruckRecord,
    #[serde(default)]
    pub comissao_luiz: PerTonRecord,
    #[serde(default)]
    pub other_fees: serde_json::Value,
}

impl CrossingPointRecord {
    /// Name the engine identifies the point by: the Brazilian side, else the record name
    pub fn crossing_name(&self) -> &str {
        let brazilian = self.brazilian_side.name.trim();
        if brazilian.is_empty() {
            self.name.trim()
        } else {
            brazilian
        }
    }
}

// ---------------------------------------------------------------------------
// Strict configuration
// ---------------------------------------------------------------------------

/// FAF amounts, all absolute Guarani
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FafSchedule {
    pub per_truck_gs: f64,
    /// Whole-shipment amount up to and including 1000 t
    pub lot1000_gs: f64,
    /// Whole-shipment amount above 1000 t
    pub lot1500_gs: f64,
}

/// The single MAPA billing structure a point uses
#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MapaFee {
    /// USD per ton
    PerTon { rate: f64 },
    /// Two USD-per-ton components billed separately
    Split { acerto: f64, fixo: f64 },
    /// BRL flat fee by shipment tier
    TieredBrl { lot1000: f64, lot1500: f64 },
}

/// A named ferry tariff, in BRL per truck
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct FerryVariant {
    pub name: String,
    pub rate: f64,
}

/// Ferry tariffs for a point whose ferry is enabled
#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FerrySchedule {
    pub default_rate: Option<f64>,
    pub variants: Vec<FerryVariant>,
}

impl FerrySchedule {
    /// Tariff for a crossing: a variant named after the partner point wins
    /// over the default. Returns the line item label and the BRL rate.
    pub fn tariff_for(&self, partner: &str) -> Option<(String, f64)> {
        self.variants
            .iter()
            .find(|v| names_match(&v.name, partner))
            .map(|v| (format!("Balsa ({})", v.name), v.rate))
            .or_else(|| self.default_rate.map(|rate| ("Balsa".to_string(), rate)))
    }
}

/// Parsed fee configuration of one crossing point
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CrossingPoint {
    /// Brazilian side name
    pub name: String,
    /// Paraguayan side name
    pub partner: String,
    pub active: bool,
    pub brazil_coordinates: Option<Coordinates>,
    pub paraguay_coordinates: Option<Coordinates>,
    pub faf: FafSchedule,
    pub fula_usd_per_ton: Option<f64>,
    pub mapa: Option<MapaFee>,
    /// `None` when the point has no ferry
    pub ferry: Option<FerrySchedule>,
    pub ferry_policy: FerryPayerPolicy,
    pub parking_brl_per_truck: Option<f64>,
    pub dinatran_brl_per_truck: Option<f64>,
    pub commission_brl_per_ton: Option<f64>,
}

fn positive(value: Option<&NumericValue>) -> Option<f64> {
    Some(numeric_or_zero(value)).filter(|v| *v > 0.0)
}

/// A fee that is always charged; negative amounts count as zero.
fn non_negative_fee(crossing: &str, category: &str, value: Option<&NumericValue>) -> f64 {
    let amount = numeric_or_zero(value);
    if amount < 0.0 {
        warn!(crossing, category, amount, "Negative fee configured, using zero");
        return 0.0;
    }
    amount
}

/// Rate of an enabled category; an enabled category without a rate is a
/// configuration gap and contributes nothing.
fn enabled_rate(crossing: &str, category: &str, enabled: bool, value: Option<&NumericValue>) -> Option<f64> {
    if !enabled {
        return None;
    }
    let rate = positive(value);
    if rate.is_none() {
        warn!(crossing, category, "Fee category enabled without a rate, skipping");
    }
    rate
}

fn parse_mapa(crossing: &str, mapa: &MapaRecord) -> Option<MapaFee> {
    let flat = positive(mapa.cost_per_ton.as_ref());
    let acerto = positive(mapa.acerto.as_ref());
    let fixo = positive(mapa.fixo.as_ref());
    let lot1000 = positive(mapa.lot1000.as_ref());
    let lot1500 = positive(mapa.lot1500.as_ref());

    let populated = [flat.is_some(), acerto.is_some() || fixo.is_some(), lot1000.is_some() || lot1500.is_some()]
        .iter()
        .filter(|p| **p)
        .count();
    if populated > 1 {
        warn!(crossing, "Several MAPA representations configured, using the highest precedence one");
    }

    if let Some(rate) = flat {
        return Some(MapaFee::PerTon { rate });
    }
    match (acerto, fixo) {
        (Some(acerto), Some(fixo)) => return Some(MapaFee::Split { acerto, fixo }),
        (Some(_), None) | (None, Some(_)) => {
            warn!(crossing, "MAPA split needs both acerto and fixo, ignoring the partial split");
        }
        (None, None) => {}
    }
    if lot1000.is_some() || lot1500.is_some() {
        return Some(MapaFee::TieredBrl {
            lot1000: lot1000.unwrap_or(0.0),
            lot1500: lot1500.unwrap_or(0.0),
        });
    }
    None
}

fn parse_ferry(crossing: &str, balsa: &BalsaRecord) -> Option<FerrySchedule> {
    if !balsa.enabled {
        return None;
    }
    let variants: Vec<FerryVariant> = positive(balsa.puerto_indio_cost.as_ref())
        .map(|rate| FerryVariant {
            name: "Puerto Indio".to_string(),
            rate,
        })
        .into_iter()
        .collect();

    let schedule = FerrySchedule {
        default_rate: positive(balsa.default_cost.as_ref()),
        variants,
    };
    if schedule.default_rate.is_none() && schedule.variants.is_empty() {
        warn!(crossing, "Ferry enabled without any tariff");
    }
    Some(schedule)
}

impl CrossingPoint {
    /// Parse the administrative record. Missing or malformed numbers become
    /// zero; enabled categories without a usable rate are dropped with a warning.
    pub fn from_record(record: &CrossingPointRecord) -> Self {
        let name = record.crossing_name().to_string();
        let known = find_known_crossing(&name);

        let partner = match record.paraguayan_side.name.trim() {
            "" => known.map(|k| k.paraguayan.to_string()).unwrap_or_default(),
            partner => partner.to_string(),
        };

        Self {
            partner,
            active: record.active,
            brazil_coordinates: record
                .brazilian_side
                .coordinates
                .or(known.map(|k| k.brazil_coordinates)),
            paraguay_coordinates: record
                .paraguayan_side
                .coordinates
                .or(known.map(|k| k.paraguay_coordinates)),
            faf: FafSchedule {
                per_truck_gs: non_negative_fee(&name, "faf", record.faf.per_truck.as_ref()),
                lot1000_gs: non_negative_fee(&name, "faf", record.faf.lot1000.as_ref()),
                lot1500_gs: non_negative_fee(&name, "faf", record.faf.lot1500.as_ref()),
            },
            fula_usd_per_ton: enabled_rate(
                &name,
                "fula",
                record.fula.enabled,
                record.fula.cost_per_ton.as_ref(),
            ),
            mapa: parse_mapa(&name, &record.mapa),
            ferry: parse_ferry(&name, &record.balsa),
            ferry_policy: record
                .balsa
                .payer
                .unwrap_or_else(|| FerryPayerPolicy::for_crossing(&name)),
            parking_brl_per_truck: enabled_rate(
                &name,
                "estacionamento",
                record.estacionamento.enabled,
                record.estacionamento.cost_per_truck.as_ref(),
            ),
            // No enable flag: a configured rate is enough
            dinatran_brl_per_truck: positive(record.dinatran.cost_per_truck.as_ref()),
            commission_brl_per_ton: enabled_rate(
                &name,
                "comissao",
                record.comissao_luiz.enabled,
                record.comissao_luiz.cost_per_ton.as_ref(),
            ),
            name,
        }
    }

    /// "Brazilian side / Paraguayan side"
    pub fn customs_point_label(&self) -> String {
        format!("{} / {}", self.name, self.partner)
    }
}
