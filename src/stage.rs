/// An agronomic phase of the rice crop and its acceptable soil-moisture band
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GrowthStage {
    pub label: &'static str,
    pub min_moisture_pct: u8,
    pub max_moisture_pct: u8,
    pub description: &'static str,
}

impl GrowthStage {
    pub fn contains(&self, moisture_pct: u8) -> bool {
        (self.min_moisture_pct..=self.max_moisture_pct).contains(&moisture_pct)
    }
}

/// Crop calendar, in order
pub const GROWTH_STAGES: [GrowthStage; 4] = [
    GrowthStage {
        label: "GERMINACAO",
        min_moisture_pct: 80,
        max_moisture_pct: 100,
        description: "Germination: keep the seedbed saturated",
    },
    GrowthStage {
        label: "VEGETATIVA",
        min_moisture_pct: 70,
        max_moisture_pct: 90,
        description: "Vegetative: moist soil, shallow flooding allowed",
    },
    GrowthStage {
        label: "FLORACAO",
        min_moisture_pct: 85,
        max_moisture_pct: 100,
        description: "Flowering: most water-sensitive phase, keep flooded",
    },
    GrowthStage {
        label: "MATURACAO",
        min_moisture_pct: 60,
        max_moisture_pct: 80,
        description: "Maturation: drain gradually before harvest",
    },
];

/// Maps an external stage index onto the table. Anything out of range
/// selects the first stage.
pub fn stage_index(index: i32) -> usize {
    usize::try_from(index)
        .ok()
        .filter(|&i| i < GROWTH_STAGES.len())
        .unwrap_or(0)
}

pub fn select_stage(index: i32) -> &'static GrowthStage {
    &GROWTH_STAGES[stage_index(index)]
}
