//! Static workshop and manufacturing knowledge tables.

use autosense_core::types::Subsystem;

/// Likely causes and corrective actions for one failure indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnowledgeEntry {
    pub indicator: &'static str,
    pub causes: &'static [&'static str],
    pub actions: &'static [&'static str],
}

const GENERAL_INSPECTION: KnowledgeEntry = KnowledgeEntry {
    indicator: "unclassified",
    causes: &["Requires inspection"],
    actions: &["General inspection"],
};

const ENGINE_HIGH_TEMP: KnowledgeEntry = KnowledgeEntry {
    indicator: "high engine temperature",
    causes: &["Coolant leak", "Thermostat failure", "Radiator blockage", "Water pump failure"],
    actions: &["Check coolant level", "Inspect thermostat", "Flush radiator", "Test water pump"],
};

const ENGINE_LOW_OIL: KnowledgeEntry = KnowledgeEntry {
    indicator: "low oil pressure",
    causes: &["Oil leak", "Worn oil pump", "Clogged oil filter", "Wrong oil viscosity"],
    actions: &["Check oil level", "Replace oil filter", "Inspect for leaks", "Oil change"],
};

const ENGINE_VIBRATION: KnowledgeEntry = KnowledgeEntry {
    indicator: "high vibration",
    causes: &["Engine mount wear", "Misfiring cylinder", "Unbalanced components", "Worn bearings"],
    actions: &["Check engine mounts", "Inspect spark plugs", "Balance rotating parts", "Check bearings"],
};

const BATTERY_LOW_VOLTAGE: KnowledgeEntry = KnowledgeEntry {
    indicator: "low battery voltage",
    causes: &["Aging battery", "Alternator failure", "Parasitic drain", "Loose connections"],
    actions: &["Test battery capacity", "Check alternator output", "Inspect electrical system", "Clean terminals"],
};

const BRAKES_HIGH_WEAR: KnowledgeEntry = KnowledgeEntry {
    indicator: "high brake wear",
    causes: &["Normal wear", "Aggressive driving", "Stuck caliper", "Warped rotors"],
    actions: &["Replace brake pads", "Inspect calipers", "Check rotors", "Brake fluid flush"],
};

const COOLING_HIGH_TEMP: KnowledgeEntry = KnowledgeEntry {
    indicator: "high coolant temperature",
    causes: &["Low coolant", "Thermostat stuck", "Fan failure", "Head gasket leak"],
    actions: &["Top up coolant", "Replace thermostat", "Test cooling fan", "Pressure test system"],
};

const TIRES_LOW_PRESSURE: KnowledgeEntry = KnowledgeEntry {
    indicator: "low tyre pressure",
    causes: &["Slow puncture", "Valve stem leak", "Temperature change", "Rim damage"],
    actions: &["Inspect tire", "Check valve stem", "Inflate to spec", "Check rim seal"],
};

/// Knowledge for `subsystem`, keyed by the leading feature that implicated it.
pub fn lookup(subsystem: Subsystem, leading_feature: Option<&str>) -> KnowledgeEntry {
    match (subsystem, leading_feature) {
        (Subsystem::Engine, Some("oil_pressure")) => ENGINE_LOW_OIL,
        (Subsystem::Engine, Some("vibration_level" | "rpm")) => ENGINE_VIBRATION,
        (Subsystem::Engine, _) => ENGINE_HIGH_TEMP,
        (Subsystem::Battery, _) => BATTERY_LOW_VOLTAGE,
        (Subsystem::Brakes, _) => BRAKES_HIGH_WEAR,
        (Subsystem::CoolingSystem, _) => COOLING_HIGH_TEMP,
        (Subsystem::Tires, _) => TIRES_LOW_PRESSURE,
        (Subsystem::Transmission | Subsystem::Other, _) => GENERAL_INSPECTION,
    }
}

/// Typical workshop time for a subsystem repair, in minutes.
pub fn repair_minutes(subsystem: Subsystem) -> u32 {
    match subsystem {
        Subsystem::Engine => 120,
        Subsystem::Battery => 30,
        Subsystem::Brakes => 90,
        Subsystem::CoolingSystem => 60,
        Subsystem::Tires => 45,
        Subsystem::Transmission => 180,
        Subsystem::Other => 60,
    }
}

/// Service-center specialty tag that covers a subsystem.
pub fn specialty_tag(subsystem: Subsystem) -> &'static str {
    match subsystem {
        Subsystem::Engine => "engine",
        Subsystem::Brakes => "brakes",
        Subsystem::Battery => "electrical",
        Subsystem::Transmission => "transmission",
        Subsystem::CoolingSystem => "cooling",
        Subsystem::Tires => "tires",
        Subsystem::Other => "general",
    }
}

/// Suspected design-level cause for a recurring subsystem failure.
pub fn suspected_design_cause(subsystem: Subsystem) -> &'static str {
    match subsystem {
        Subsystem::Engine => "Material fatigue",
        Subsystem::Battery => "Charging system design",
        Subsystem::Brakes => "Pad compound formulation",
        Subsystem::CoolingSystem => "Coolant flow design",
        Subsystem::Tires => "Compound mixture",
        Subsystem::Transmission => "Gear material",
        Subsystem::Other => "Design review needed",
    }
}

/// Manufacturing recommendation for a recurring subsystem failure.
pub fn manufacturing_recommendation(subsystem: Subsystem) -> &'static str {
    match subsystem {
        Subsystem::Engine => "Review material specifications and heat treatment process",
        Subsystem::Battery => "Evaluate thermal management system and charging protocols",
        Subsystem::Brakes => "Test alternative pad compounds and review caliper tolerances",
        Subsystem::CoolingSystem => "Analyze coolant flow patterns and component specifications",
        Subsystem::Tires => "Review compound formulation and manufacturing process",
        Subsystem::Transmission => "Examine gear cutting process and lubrication system design",
        Subsystem::Other => "Conduct detailed engineering review",
    }
}
