/// Payload of one truck, in metric tons
pub const TRUCK_CAPACITY_TONS: f64 = 32.0;

/// Largest shipment a single quote accepts, in metric tons
pub const MAX_TONNAGE: f64 = 1_000_000.0;

/// Number of trucks needed to haul `tonnage`; zero for non-positive or
/// non-finite input. Counts beyond `u32::MAX` are capped there.
pub fn required_trucks(tonnage: f64) -> u32 {
    if !tonnage.is_finite() || tonnage <= 0.0 {
        return 0;
    }
    let trucks = (tonnage / TRUCK_CAPACITY_TONS).ceil();
    if trucks >= f64::from(u32::MAX) {
        return u32::MAX;
    }
    trucks as u32
}
