//! Fee computation rules.
//!
//! One function per fee category. Each converts into USD and produces a
//! labelled [`CostLineItem`]. [`fee_items`] applies them in presentation
//! order, which is part of the quote contract.

use tracing::warn;

use crate::crossing_point::{CrossingPoint, FafSchedule, MapaFee};
use crate::currency::{Currency, ExchangeRates, to_usd};
use crate::error::FreightResult;
use crate::models::{CostLineItem, CustomsProcess, FerryPayer};

/// Reference freight is `(km / 25) * tons`
pub const BASE_FREIGHT_KM_DIVISOR: f64 = 25.0;
/// Lot-size tiers switch above this many tons
pub const LOT_TIER_THRESHOLD_TONS: f64 = 1000.0;
/// Insurance premium as a fraction of the merchandise value (0.14%)
pub const INSURANCE_RATE: f64 = 0.0014;

/// Everything the rules need about one request at one crossing point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuleContext {
    pub tonnage: f64,
    pub trucks: u32,
    pub rates: ExchangeRates,
    pub driver_payment_brl_per_ton: f64,
    pub merchandise_value_usd: f64,
    pub include_insurance: bool,
    pub special_handling: bool,
    pub special_handling_rate_usd: f64,
    pub process: CustomsProcess,
    pub ferry_payer: FerryPayer,
}

impl RuleContext {
    fn is_small_lot(&self) -> bool {
        self.tonnage <= LOT_TIER_THRESHOLD_TONS
    }

    fn trucks_label(&self) -> String {
        if self.trucks == 1 {
            "1 caminhão".to_string()
        } else {
            format!("{} caminhões", self.trucks)
        }
    }
}

/// Group thousands with dots, pt-BR style: 1600000 → "1.600.000"
pub fn format_grouped(value: f64) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    let rounded = value.round();
    let digits = format!("{:.0}", rounded.abs());
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(c);
    }
    if rounded < 0.0 {
        format!("-{grouped}")
    } else {
        grouped
    }
}

/// Distance-based freight estimate used only to rank crossing points.
pub fn base_freight(distance_km: f64, tonnage: f64) -> CostLineItem {
    let value = (distance_km / BASE_FREIGHT_KM_DIVISOR) * tonnage;
    let value = if value.is_finite() { value } else { 0.0 };
    CostLineItem::reference(
        "Frete Base (Referência)",
        format!(
            "({} km ÷ 25) × {} toneladas - *APENAS PARA CÁLCULO INTERNO*",
            distance_km.round(),
            tonnage
        ),
        value,
    )
}

/// Per-truck Guarani fee plus the whole-shipment tier amount.
pub fn faf(schedule: &FafSchedule, ctx: &RuleContext) -> FreightResult<CostLineItem> {
    let per_truck_total = f64::from(ctx.trucks) * schedule.per_truck_gs;
    let lot = if ctx.is_small_lot() {
        schedule.lot1000_gs
    } else {
        schedule.lot1500_gs
    };
    let total_gs = per_truck_total + lot;

    Ok(CostLineItem::billable(
        "FAF",
        format!(
            "{} × {} GS + {} GS = {} GS",
            ctx.trucks_label(),
            format_grouped(schedule.per_truck_gs),
            format_grouped(lot),
            format_grouped(total_gs)
        ),
        to_usd(total_gs, Currency::Gs, &ctx.rates)?,
    ))
}

pub fn fula(usd_per_ton: Option<f64>, ctx: &RuleContext) -> Option<CostLineItem> {
    usd_per_ton.map(|rate| {
        CostLineItem::billable(
            "FULA",
            format!("{} toneladas × {:.2} USD/ton", ctx.tonnage, rate),
            ctx.tonnage * rate,
        )
    })
}

pub fn mapa(fee: Option<&MapaFee>, ctx: &RuleContext) -> FreightResult<Vec<CostLineItem>> {
    let per_ton = |label: &str, rate: f64| {
        CostLineItem::billable(
            label,
            format!("{} toneladas × {:.2} USD/ton", ctx.tonnage, rate),
            ctx.tonnage * rate,
        )
    };

    let items = match fee {
        None => Vec::new(),
        Some(MapaFee::PerTon { rate }) => vec![per_ton("Mapa/Ministério", *rate)],
        Some(MapaFee::Split { acerto, fixo }) => vec![
            per_ton("Mapa/Ministério (Acerto)", *acerto),
            per_ton("Mapa/Ministério (Fixo)", *fixo),
        ],
        Some(MapaFee::TieredBrl { lot1000, lot1500 }) => {
            let (amount, details) = if ctx.is_small_lot() && *lot1000 > 0.0 {
                (
                    *lot1000,
                    format!("Taxa fixa para lotes até 1000 toneladas: R$ {:.2}", lot1000),
                )
            } else if *lot1500 > 0.0 {
                (
                    *lot1500,
                    format!("Taxa fixa para lotes acima de 1000 toneladas: R$ {:.2}", lot1500),
                )
            } else {
                warn!(tonnage = ctx.tonnage, "No MAPA tier configured for this lot size");
                return Ok(Vec::new());
            };
            vec![CostLineItem::billable(
                "Mapa/Ministério",
                details,
                to_usd(amount, Currency::Brl, &ctx.rates)?,
            )]
        }
    };
    Ok(items)
}

/// Company-paid ferry cost, or a zero-value note when the driver pays.
pub fn ferry(point: &CrossingPoint, ctx: &RuleContext) -> FreightResult<Option<CostLineItem>> {
    let Some(schedule) = point.ferry.as_ref() else {
        return Ok(None);
    };

    if ctx.ferry_payer == FerryPayer::Driver {
        return Ok(Some(CostLineItem::billable(
            "Balsa",
            "Motorista paga (não incluso no custo)",
            0.0,
        )));
    }

    let Some((label, rate)) = schedule.tariff_for(&point.partner) else {
        warn!(crossing = %point.name, "Company-paid ferry has no tariff configured, skipping");
        return Ok(None);
    };

    let total_brl = f64::from(ctx.trucks) * rate;
    Ok(Some(CostLineItem::billable(
        label,
        format!(
            "{} × R$ {:.2} = R$ {:.2}",
            ctx.trucks_label(),
            rate,
            total_brl
        ),
        to_usd(total_brl, Currency::Brl, &ctx.rates)?,
    )))
}

fn per_truck_brl(
    label: &str,
    rate: Option<f64>,
    ctx: &RuleContext,
) -> FreightResult<Option<CostLineItem>> {
    let Some(rate) = rate else {
        return Ok(None);
    };
    Ok(Some(CostLineItem::billable(
        label,
        format!("{} × R$ {:.2}", ctx.trucks_label(), rate),
        to_usd(f64::from(ctx.trucks) * rate, Currency::Brl, &ctx.rates)?,
    )))
}

pub fn parking(brl_per_truck: Option<f64>, ctx: &RuleContext) -> FreightResult<Option<CostLineItem>> {
    per_truck_brl("Estacionamento", brl_per_truck, ctx)
}

pub fn dinatran(brl_per_truck: Option<f64>, ctx: &RuleContext) -> FreightResult<Option<CostLineItem>> {
    per_truck_brl("Dinatran", brl_per_truck, ctx)
}

pub fn commission(brl_per_ton: Option<f64>, ctx: &RuleContext) -> FreightResult<Option<CostLineItem>> {
    let Some(rate) = brl_per_ton else {
        return Ok(None);
    };
    Ok(Some(CostLineItem::billable(
        "Comissão Luiz Baciquet",
        format!("{} toneladas × R$ {:.2}/ton", ctx.tonnage, rate),
        to_usd(ctx.tonnage * rate, Currency::Brl, &ctx.rates)?,
    )))
}

/// The driver's wage; always present, even when zero.
pub fn driver_payment(ctx: &RuleContext) -> FreightResult<CostLineItem> {
    Ok(CostLineItem::billable(
        "Pagamento Motorista",
        format!(
            "{} toneladas × R$ {:.2}/ton",
            ctx.tonnage, ctx.driver_payment_brl_per_ton
        ),
        to_usd(
            ctx.tonnage * ctx.driver_payment_brl_per_ton,
            Currency::Brl,
            &ctx.rates,
        )?,
    ))
}

pub fn insurance(ctx: &RuleContext) -> Option<CostLineItem> {
    if !ctx.include_insurance || ctx.merchandise_value_usd <= 0.0 {
        return None;
    }
    Some(CostLineItem::billable(
        "Seguro",
        format!("${:.2} × 0.14%", ctx.merchandise_value_usd),
        ctx.merchandise_value_usd * INSURANCE_RATE,
    ))
}

pub fn special_handling(ctx: &RuleContext) -> Option<CostLineItem> {
    if !ctx.special_handling {
        return None;
    }
    Some(CostLineItem::billable(
        "Manuseio Especial",
        format!(
            "{} toneladas × ${:.2}/ton",
            ctx.tonnage, ctx.special_handling_rate_usd
        ),
        ctx.tonnage * ctx.special_handling_rate_usd,
    ))
}

/// Percentage surcharge over the running subtotal of the items before it.
pub fn process_surcharge(running_subtotal: f64, process: CustomsProcess) -> Option<CostLineItem> {
    let rate = process.surcharge_rate()?;
    let (label, details) = match process {
        CustomsProcess::Expedited => ("Processo Acelerado", "Taxa adicional de 15% (3-5 dias)"),
        CustomsProcess::Priority => ("Processo Prioritário", "Taxa adicional de 30% (1-2 dias)"),
        CustomsProcess::Normal => return None,
    };
    Some(CostLineItem::billable(label, details, running_subtotal * rate))
}

/// Sum of the items that count towards the customer's total
pub fn billable_sum(items: &[CostLineItem]) -> f64 {
    items
        .iter()
        .filter(|item| !item.is_reference_only)
        .map(|item| item.value)
        .sum()
}

/// All billable fee items for `point`, in presentation order.
pub fn fee_items(point: &CrossingPoint, ctx: &RuleContext) -> FreightResult<Vec<CostLineItem>> {
    let mut items = vec![faf(&point.faf, ctx)?];
    items.extend(fula(point.fula_usd_per_ton, ctx));
    items.extend(mapa(point.mapa.as_ref(), ctx)?);
    items.extend(ferry(point, ctx)?);
    items.extend(parking(point.parking_brl_per_truck, ctx)?);
    items.extend(dinatran(point.dinatran_brl_per_truck, ctx)?);
    items.extend(commission(point.commission_brl_per_ton, ctx)?);
    items.push(driver_payment(ctx)?);
    items.extend(insurance(ctx));
    items.extend(special_handling(ctx));

    let running = billable_sum(&items);
    items.extend(process_surcharge(running, ctx.process));
    Ok(items)
}
