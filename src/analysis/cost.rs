//! 按损伤类型、严重程度和品牌估算维修费用

use serde::{Deserialize, Serialize};

pub const CURRENCY: &str = "DT";

/// 人工费占零件费的比例
const LABOR_RATE: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq)]
struct BrandTariff {
    multiplier: f64,
    base_cost: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct DamageTariff {
    cost: f64,
    minor: f64,
    moderate: f64,
    severe: f64,
}

const fn brand(multiplier: f64, base_cost: f64) -> BrandTariff {
    BrandTariff { multiplier, base_cost }
}

const fn damage(cost: f64, minor: f64, moderate: f64, severe: f64) -> DamageTariff {
    DamageTariff {
        cost,
        minor,
        moderate,
        severe,
    }
}

impl DamageTariff {
    fn multiplier(&self, severity: Severity) -> f64 {
        match severity {
            Severity::Minor => self.minor,
            Severity::Moderate => self.moderate,
            Severity::Severe => self.severe,
        }
    }
}

const UNKNOWN_BRAND: BrandTariff = brand(1.2, 300.0);

const BRANDS: &[(&str, BrandTariff)] = &[
    ("BMW", brand(1.8, 500.0)),
    ("Mercedes", brand(1.9, 550.0)),
    ("Audi", brand(1.7, 480.0)),
    ("Toyota", brand(1.2, 300.0)),
    ("Honda", brand(1.1, 280.0)),
    ("Volkswagen", brand(1.4, 350.0)),
    ("Ford", brand(1.3, 320.0)),
    ("Peugeot", brand(1.2, 290.0)),
    ("Renault", brand(1.1, 270.0)),
    ("Hyundai", brand(1.0, 250.0)),
    ("Unknown", UNKNOWN_BRAND),
];

/// 未知损伤类型按凹陷计价
const FALLBACK_DAMAGE: DamageTariff = damage(400.0, 0.5, 1.0, 1.8);

const DAMAGES: &[(&str, DamageTariff)] = &[
    ("dent", FALLBACK_DAMAGE),
    ("scratch", damage(200.0, 0.3, 0.8, 1.5)),
    ("crack", damage(600.0, 0.6, 1.2, 2.0)),
    ("broken_light", damage(350.0, 0.8, 1.0, 1.3)),
    ("bumper_damage", damage(800.0, 0.7, 1.0, 1.6)),
    ("door_damage", damage(1200.0, 0.6, 1.0, 1.8)),
    ("windshield_damage", damage(500.0, 0.8, 1.0, 1.4)),
];

/// 由检测置信度推断的严重程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Minor,
    Moderate,
    Severe,
}

impl Severity {
    pub fn from_confidence(confidence: f32) -> Self {
        if confidence > 0.8 {
            Severity::Severe
        } else if confidence > 0.6 {
            Severity::Moderate
        } else {
            Severity::Minor
        }
    }
}

/// 估价请求中的单个损伤，通常直接来自检测端点的输出
#[derive(Debug, Clone, Deserialize)]
pub struct DamageItem {
    #[serde(rename = "class")]
    pub class_name: String,
    pub confidence: f32,
    #[serde(default)]
    pub bbox: Vec<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CostEstimateRequest {
    pub detections: Vec<DamageItem>,
    #[serde(default)]
    pub brand: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CostItem {
    pub damage_type: String,
    pub severity: Severity,
    pub confidence: f32,
    pub cost: i64,
    pub location: Vec<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CostEstimate {
    pub total_cost: i64,
    pub parts_cost: i64,
    pub labor_cost: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    pub breakdown: Vec<CostItem>,
    pub currency: &'static str,
}

fn brand_tariff(brand: Option<&str>) -> BrandTariff {
    brand
        .and_then(|name| BRANDS.iter().find(|(key, _)| *key == name))
        .map(|(_, tariff)| *tariff)
        .unwrap_or(UNKNOWN_BRAND)
}

fn damage_tariff(key: &str) -> DamageTariff {
    DAMAGES
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, tariff)| *tariff)
        .unwrap_or(FALLBACK_DAMAGE)
}

/// 类名转为价目表键：小写，第一个空格替换为下划线
pub fn damage_key(class_name: &str) -> String {
    class_name.to_lowercase().replacen(' ', "_", 1)
}

pub fn estimate(request: &CostEstimateRequest) -> CostEstimate {
    let brand_rate = brand_tariff(request.brand.as_deref());

    let breakdown: Vec<CostItem> = request
        .detections
        .iter()
        .map(|item| {
            let severity = Severity::from_confidence(item.confidence);
            let tariff = damage_tariff(&damage_key(&item.class_name));
            let repair = tariff.cost * tariff.multiplier(severity) * brand_rate.multiplier;
            let cost = (repair + brand_rate.base_cost).round() as i64;

            CostItem {
                damage_type: item.class_name.clone(),
                severity,
                confidence: item.confidence,
                cost,
                location: item.bbox.clone(),
            }
        })
        .collect();

    let parts_cost: i64 = breakdown.iter().map(|item| item.cost).sum();
    let labor_cost = (parts_cost as f64 * LABOR_RATE).round() as i64;

    tracing::debug!(
        "Cost estimate: {} items, parts {}, labor {}",
        breakdown.len(),
        parts_cost,
        labor_cost
    );

    CostEstimate {
        total_cost: parts_cost + labor_cost,
        parts_cost,
        labor_cost,
        brand: request.brand.clone(),
        breakdown,
        currency: CURRENCY,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(class_name: &str, confidence: f32) -> DamageItem {
        DamageItem {
            class_name: class_name.to_string(),
            confidence,
            bbox: vec![1.0, 2.0, 3.0, 4.0],
        }
    }

    #[test]
    fn test_severity_from_confidence() {
        assert_eq!(Severity::from_confidence(0.9), Severity::Severe);
        assert_eq!(Severity::from_confidence(0.8), Severity::Moderate);
        assert_eq!(Severity::from_confidence(0.61), Severity::Moderate);
        assert_eq!(Severity::from_confidence(0.6), Severity::Minor);
    }

    #[test]
    fn test_damage_key_replaces_first_space_only() {
        assert_eq!(damage_key("Broken Light"), "broken_light");
        assert_eq!(damage_key("front bumper damage"), "front_bumper damage");
    }

    #[test]
    fn test_bmw_severe_dent() {
        let request = CostEstimateRequest {
            detections: vec![item("dent", 0.9)],
            brand: Some("BMW".to_string()),
        };
        let estimate = estimate(&request);

        // 400 * 1.8 * 1.8 + 500 = 1796
        assert_eq!(estimate.parts_cost, 1796);
        assert_eq!(estimate.labor_cost, 539);
        assert_eq!(estimate.total_cost, 2335);
        assert_eq!(estimate.breakdown[0].severity, Severity::Severe);
        assert_eq!(estimate.breakdown[0].location, vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(estimate.currency, "DT");
    }

    #[test]
    fn test_unknown_brand_and_damage_fall_back() {
        let request = CostEstimateRequest {
            detections: vec![item("Broken Light", 0.5), item("rust", 0.7)],
            brand: Some("Tesla".to_string()),
        };
        let estimate = estimate(&request);

        // broken_light minor: 350 * 0.8 * 1.2 + 300 = 636
        // rust -> dent moderate: 400 * 1.0 * 1.2 + 300 = 780
        let costs: Vec<i64> = estimate.breakdown.iter().map(|i| i.cost).collect();
        assert_eq!(costs, vec![636, 780]);
        assert_eq!(estimate.parts_cost, 1416);
        assert_eq!(estimate.labor_cost, 425);
        assert_eq!(estimate.brand.as_deref(), Some("Tesla"));
        assert_eq!(estimate.breakdown[0].damage_type, "Broken Light");
    }

    #[test]
    fn test_empty_detections() {
        let request = CostEstimateRequest {
            detections: Vec::new(),
            brand: None,
        };
        let estimate = estimate(&request);
        assert_eq!(estimate.total_cost, 0);

        let value = serde_json::to_value(&estimate).unwrap();
        assert!(value.get("brand").is_none());
        assert_eq!(value["breakdown"], serde_json::json!([]));
    }

    #[test]
    fn test_request_from_detection_output() {
        let body = serde_json::json!({
            "detections": [{"class": "scratch", "confidence": 0.7, "bbox": [10, 20, 30, 40]}],
            "brand": "Honda"
        });
        let request: CostEstimateRequest = serde_json::from_value(body).unwrap();
        let estimate = estimate(&request);

        // 200 * 0.8 * 1.1 + 280 = 456
        assert_eq!(estimate.parts_cost, 456);
        let value = serde_json::to_value(&estimate).unwrap();
        assert_eq!(value["breakdown"][0]["severity"], "moderate");
    }

    #[test]
    fn test_tariff_tables() {
        assert_eq!(BRANDS.len(), 11);
        assert_eq!(brand_tariff(Some("Mercedes")), brand(1.9, 550.0));
        assert_eq!(brand_tariff(None), UNKNOWN_BRAND);
        // 品牌名区分大小写
        assert_eq!(brand_tariff(Some("bmw")), UNKNOWN_BRAND);

        assert_eq!(DAMAGES.len(), 7);
        assert_eq!(damage_tariff("door_damage"), damage(1200.0, 0.6, 1.0, 1.8));
        assert_eq!(damage_tariff("dent"), FALLBACK_DAMAGE);
        assert_eq!(damage_tariff("paint"), FALLBACK_DAMAGE);
    }
}
