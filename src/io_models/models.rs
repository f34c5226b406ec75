use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, de};
use serde_with::SerializeDisplay;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

pub static KUBERNETES_CPU_RESOURCE_VALUE_REGEX: Lazy<Regex> = Lazy::new(|| {
    let pattern = r"^(\d+)(?:\.(\d+))?(m?)$";
    Regex::new(pattern).expect("cpu resource regex is valid")
});

/// `integer.fraction * scale`, rounded up like Kubernetes does for quantities too precise for their unit.
fn scaled_decimal(integer: &str, fraction: &str, scale: u128) -> Option<u128> {
    let denominator = 10u128.checked_pow(fraction.len() as u32)?;
    let fraction = match fraction {
        "" => 0,
        fraction => fraction.parse::<u128>().ok()?,
    };
    let numerator = integer
        .parse::<u128>()
        .ok()?
        .checked_mul(denominator)?
        .checked_add(fraction)?;

    Some(numerator.checked_mul(scale)?.div_ceil(denominator))
}

/// Represents Kubernetes CPU resource unit as written in chart values.
/// https://kubernetes.io/docs/concepts/configuration/manage-resources-containers/#meaning-of-cpu
///
/// Fractional cores (`0.5`) are kept as milli CPU (`500m`).
#[derive(SerializeDisplay, Clone, Debug, Eq, PartialEq)]
pub enum KubernetesCpuResourceUnit {
    /// Milli CPU
    MilliCpu(u32),
    /// Whole CPU cores
    Cpu(u32),
}

impl KubernetesCpuResourceUnit {
    pub fn as_milli_cpu(&self) -> u64 {
        match self {
            KubernetesCpuResourceUnit::MilliCpu(v) => *v as u64,
            KubernetesCpuResourceUnit::Cpu(v) => *v as u64 * 1000,
        }
    }

    fn from_cores(cores: f64) -> Result<Self, String> {
        let milli_cpu = (cores * 1000.0).ceil();
        if !milli_cpu.is_finite() || milli_cpu < 0.0 || milli_cpu > u32::MAX as f64 {
            return Err(format!("Cannot get KubernetesCpuResourceUnit from '{cores}' cores"));
        }

        Ok(KubernetesCpuResourceUnit::MilliCpu(milli_cpu as u32))
    }
}

impl FromStr for KubernetesCpuResourceUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let cpu_value_with_unit = match KUBERNETES_CPU_RESOURCE_VALUE_REGEX.captures(s) {
            None => return Err(format!("Cannot get KubernetesCpuResourceUnit from string '{s}'")),
            Some(capture) => capture,
        };
        let is_milli = &cpu_value_with_unit[3] == "m";

        let cpu_value = match cpu_value_with_unit.get(2) {
            None => cpu_value_with_unit[1].parse::<u32>().ok(),
            Some(fraction) => {
                let scale = if is_milli { 1 } else { 1000 };
                scaled_decimal(&cpu_value_with_unit[1], fraction.as_str(), scale).and_then(|v| u32::try_from(v).ok())
            }
        };
        let cpu_value = cpu_value.ok_or_else(|| format!("Cannot parse cpu size part of '{s}'"))?;

        Ok(match (is_milli, cpu_value_with_unit.get(2)) {
            (false, None) => KubernetesCpuResourceUnit::Cpu(cpu_value),
            _ => KubernetesCpuResourceUnit::MilliCpu(cpu_value),
        })
    }
}

// cores are commonly written as plain YAML numbers (`cpu: 1`, `cpu: 0.5`)
impl<'de> Deserialize<'de> for KubernetesCpuResourceUnit {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawCpu {
            Cores(u32),
            FractionalCores(f64),
            Quantity(String),
        }

        match RawCpu::deserialize(deserializer)? {
            RawCpu::Cores(cores) => Ok(KubernetesCpuResourceUnit::Cpu(cores)),
            RawCpu::FractionalCores(cores) => KubernetesCpuResourceUnit::from_cores(cores).map_err(de::Error::custom),
            RawCpu::Quantity(quantity) => quantity.parse().map_err(de::Error::custom),
        }
    }
}

impl Display for KubernetesCpuResourceUnit {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            KubernetesCpuResourceUnit::MilliCpu(v) => write!(f, "{v}m"),
            KubernetesCpuResourceUnit::Cpu(v) => write!(f, "{v}"),
        }
    }
}

pub static KUBERNETES_MEMORY_RESOURCE_VALUE_REGEX: Lazy<Regex> = Lazy::new(|| {
    let pattern = r"^(\d+)(?:\.(\d+))?(Ki|Mi|Gi|Ti|Pi|Ei|k|M|G|T|P|E|[eE]\d+)?$";
    Regex::new(pattern).expect("memory resource regex is valid")
});

/// Represents Kubernetes memory / storage quantity as written in chart values.
/// https://kubernetes.io/docs/concepts/configuration/manage-resources-containers/#meaning-of-memory
#[derive(SerializeDisplay, Clone, Debug, Eq, PartialEq)]
pub enum KubernetesMemoryResourceUnit {
    /// Plain bytes, also holds decimal quantities (`1.5Gi`) and the less common units.
    Byte(u64),
    /// KibiByte: 1 Kibibyte (Ki) = 1024 bytes.
    KibiByte(u32),
    /// MebiByte: 1 Mebibyte (Mi) = (1024)^2 bytes = 1,048,576 bytes.
    MebiByte(u32),
    /// MegaByte: 1 Megabyte (M) = (1000)^2 bytes = 1,000,000 bytes.
    MegaByte(u32),
    /// GibiByte: 1 Gibibyte (Gi) = 2^30 bytes = 1,073,741,824 bytes.
    GibiByte(u32),
    /// GigaByte: 1 Gigabyte (G) = 10^9 bytes = 1,000,000,000 bytes
    GigaByte(u32),
    /// TebiByte: 1 Tebibyte (Ti) = 2^40 bytes.
    TebiByte(u32),
    /// TeraByte: 1 Terabyte (T) = 10^12 bytes.
    TeraByte(u32),
}

impl KubernetesMemoryResourceUnit {
    pub fn as_bytes(&self) -> u64 {
        match self {
            KubernetesMemoryResourceUnit::Byte(v) => *v,
            KubernetesMemoryResourceUnit::KibiByte(v) => *v as u64 * 1024,
            KubernetesMemoryResourceUnit::MebiByte(v) => *v as u64 * 1024 * 1024,
            KubernetesMemoryResourceUnit::MegaByte(v) => *v as u64 * 1_000_000,
            KubernetesMemoryResourceUnit::GibiByte(v) => *v as u64 * 1024 * 1024 * 1024,
            KubernetesMemoryResourceUnit::GigaByte(v) => *v as u64 * 1_000_000_000,
            KubernetesMemoryResourceUnit::TebiByte(v) => *v as u64 * 1024 * 1024 * 1024 * 1024,
            KubernetesMemoryResourceUnit::TeraByte(v) => *v as u64 * 1_000_000_000_000,
        }
    }
}

fn unit_multiplier(unit: &str) -> Option<u128> {
    Some(match unit {
        "" => 1,
        "Ki" => 1 << 10,
        "Mi" => 1 << 20,
        "Gi" => 1 << 30,
        "Ti" => 1 << 40,
        "Pi" => 1 << 50,
        "Ei" => 1 << 60,
        "k" => 1_000,
        "M" => 1_000_000,
        "G" => 1_000_000_000,
        "T" => 1_000_000_000_000,
        "P" => 1_000_000_000_000_000,
        "E" => 1_000_000_000_000_000_000,
        exponent => 10u128.checked_pow(exponent[1..].parse::<u32>().ok()?)?,
    })
}

impl Display for KubernetesMemoryResourceUnit {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            KubernetesMemoryResourceUnit::Byte(v) => write!(f, "{v}"),
            KubernetesMemoryResourceUnit::KibiByte(v) => write!(f, "{v}Ki"),
            KubernetesMemoryResourceUnit::MebiByte(v) => write!(f, "{v}Mi"),
            KubernetesMemoryResourceUnit::MegaByte(v) => write!(f, "{v}M"),
            KubernetesMemoryResourceUnit::GibiByte(v) => write!(f, "{v}Gi"),
            KubernetesMemoryResourceUnit::GigaByte(v) => write!(f, "{v}G"),
            KubernetesMemoryResourceUnit::TebiByte(v) => write!(f, "{v}Ti"),
            KubernetesMemoryResourceUnit::TeraByte(v) => write!(f, "{v}T"),
        }
    }
}

impl FromStr for KubernetesMemoryResourceUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let memory_value_with_unit = match KUBERNETES_MEMORY_RESOURCE_VALUE_REGEX.captures(s) {
            None => return Err(format!("Cannot get KubernetesMemoryResourceUnit from string '{s}'")),
            Some(capture) => capture,
        };
        let unit = memory_value_with_unit.get(3).map(|u| u.as_str()).unwrap_or_default();

        // whole values of the usual units keep their unit
        if memory_value_with_unit.get(2).is_none() {
            if let Ok(memory_size) = memory_value_with_unit[1].parse::<u32>() {
                match unit {
                    "Ki" => return Ok(KubernetesMemoryResourceUnit::KibiByte(memory_size)),
                    "Mi" => return Ok(KubernetesMemoryResourceUnit::MebiByte(memory_size)),
                    "Gi" => return Ok(KubernetesMemoryResourceUnit::GibiByte(memory_size)),
                    "Ti" => return Ok(KubernetesMemoryResourceUnit::TebiByte(memory_size)),
                    "M" => return Ok(KubernetesMemoryResourceUnit::MegaByte(memory_size)),
                    "G" => return Ok(KubernetesMemoryResourceUnit::GigaByte(memory_size)),
                    "T" => return Ok(KubernetesMemoryResourceUnit::TeraByte(memory_size)),
                    _ => {}
                }
            }
        }

        let fraction = memory_value_with_unit.get(2).map(|f| f.as_str()).unwrap_or_default();
        unit_multiplier(unit)
            .and_then(|multiplier| scaled_decimal(&memory_value_with_unit[1], fraction, multiplier))
            .and_then(|bytes| u64::try_from(bytes).ok())
            .map(KubernetesMemoryResourceUnit::Byte)
            .ok_or_else(|| format!("Memory quantity '{s}' is too large"))
    }
}

// plain byte counts are commonly written as YAML numbers (`memory: 134217728`)
impl<'de> Deserialize<'de> for KubernetesMemoryResourceUnit {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawMemory {
            Bytes(u64),
            Decimal(f64),
            Quantity(String),
        }

        match RawMemory::deserialize(deserializer)? {
            RawMemory::Bytes(bytes) => Ok(KubernetesMemoryResourceUnit::Byte(bytes)),
            RawMemory::Decimal(bytes) => {
                let bytes = bytes.ceil();
                if !bytes.is_finite() || bytes < 0.0 || bytes > u64::MAX as f64 {
                    return Err(de::Error::custom(format!("Cannot get memory quantity from '{bytes}'")));
                }
                Ok(KubernetesMemoryResourceUnit::Byte(bytes as u64))
            }
            RawMemory::Quantity(quantity) => quantity.parse().map_err(de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::io_models::models::{KubernetesCpuResourceUnit, KubernetesMemoryResourceUnit};
    use serde_derive::{Deserialize, Serialize};
    use std::str::FromStr;

    #[test]
    fn should_get_kubernetes_cpu_unit_from_string() {
        // setup:
        struct TestCase<'a> {
            input: &'a str,
            output: Result<KubernetesCpuResourceUnit, ()>,
        }

        let test_cases = vec![
            TestCase {
                input: "0m",
                output: Ok(KubernetesCpuResourceUnit::MilliCpu(0)),
            },
            TestCase {
                input: "250m",
                output: Ok(KubernetesCpuResourceUnit::MilliCpu(250)),
            },
            TestCase {
                input: "2",
                output: Ok(KubernetesCpuResourceUnit::Cpu(2)),
            },
            TestCase {
                input: "0.5",
                output: Ok(KubernetesCpuResourceUnit::MilliCpu(500)),
            },
            TestCase {
                input: "1.25",
                output: Ok(KubernetesCpuResourceUnit::MilliCpu(1250)),
            },
            TestCase {
                input: "0.0001",
                output: Ok(KubernetesCpuResourceUnit::MilliCpu(1)),
            },
            TestCase {
                input: "2.5m",
                output: Ok(KubernetesCpuResourceUnit::MilliCpu(3)),
            },
            TestCase {
                input: ".5",
                output: Err(()),
            },
            TestCase {
                input: "-1",
                output: Err(()),
            },
            TestCase {
                input: "100Mi",
                output: Err(()),
            },
        ];

        for tc in test_cases {
            // execute & verify:
            assert_eq!(
                tc.output,
                KubernetesCpuResourceUnit::from_str(tc.input).map_err(|_| ()),
                "input: {}",
                tc.input
            );
        }
    }

    #[test]
    fn should_get_kubernetes_memory_unit_from_string() {
        // setup:
        struct TestCase<'a> {
            input: &'a str,
            output: Result<KubernetesMemoryResourceUnit, ()>,
        }

        let test_cases = vec![
            TestCase {
                input: "350Mi",
                output: Ok(KubernetesMemoryResourceUnit::MebiByte(350)),
            },
            TestCase {
                input: "20Gi",
                output: Ok(KubernetesMemoryResourceUnit::GibiByte(20)),
            },
            TestCase {
                input: "512Ki",
                output: Ok(KubernetesMemoryResourceUnit::KibiByte(512)),
            },
            TestCase {
                input: "1T",
                output: Ok(KubernetesMemoryResourceUnit::TeraByte(1)),
            },
            TestCase {
                input: "1.5Gi",
                output: Ok(KubernetesMemoryResourceUnit::Byte(1_610_612_736)),
            },
            TestCase {
                input: "134217728",
                output: Ok(KubernetesMemoryResourceUnit::Byte(134_217_728)),
            },
            TestCase {
                input: "129e6",
                output: Ok(KubernetesMemoryResourceUnit::Byte(129_000_000)),
            },
            TestCase {
                input: "128k",
                output: Ok(KubernetesMemoryResourceUnit::Byte(128_000)),
            },
            TestCase {
                input: "2Pi",
                output: Ok(KubernetesMemoryResourceUnit::Byte(2 << 50)),
            },
            TestCase {
                input: "5000000000Ki",
                output: Ok(KubernetesMemoryResourceUnit::Byte(5_000_000_000 * 1024)),
            },
            TestCase {
                input: "20Ei",
                output: Err(()),
            },
            TestCase {
                input: "20gi",
                output: Err(()),
            },
            TestCase {
                input: "Gi",
                output: Err(()),
            },
        ];

        for tc in test_cases {
            // execute & verify:
            assert_eq!(
                tc.output,
                KubernetesMemoryResourceUnit::from_str(tc.input).map_err(|_| ()),
                "input: {}",
                tc.input
            );
        }
    }

    #[test]
    fn test_resource_units_are_serialized_as_kubernetes_quantities() {
        #[derive(Serialize, Deserialize, PartialEq, Debug)]
        struct Resources {
            cpu: KubernetesCpuResourceUnit,
            memory: KubernetesMemoryResourceUnit,
        }

        let resources = Resources {
            cpu: KubernetesCpuResourceUnit::MilliCpu(100),
            memory: KubernetesMemoryResourceUnit::MebiByte(200),
        };

        let yaml = serde_yaml::to_string(&resources).expect("cannot serialize resources");
        assert_eq!(yaml, "cpu: 100m\nmemory: 200Mi\n");

        let parsed: Resources = serde_yaml::from_str(&yaml).expect("cannot deserialize resources");
        assert_eq!(parsed, resources);
        assert_eq!(parsed.memory.as_bytes(), 200 * 1024 * 1024);
        let whole_core: Resources = serde_yaml::from_str("cpu: 1\nmemory: 1Gi\n").expect("cannot deserialize cores");
        assert_eq!(whole_core.cpu, KubernetesCpuResourceUnit::Cpu(1));
        assert_eq!(whole_core.cpu.as_milli_cpu(), 1000);
        assert!(serde_yaml::from_str::<Resources>("cpu: 1\nmemory: lots\n").is_err());

        let plain_numbers: Resources =
            serde_yaml::from_str("cpu: 0.5\nmemory: 134217728\n").expect("cannot deserialize plain numbers");
        assert_eq!(plain_numbers.cpu, KubernetesCpuResourceUnit::MilliCpu(500));
        assert_eq!(plain_numbers.memory, KubernetesMemoryResourceUnit::Byte(134_217_728));
        assert!(serde_yaml::from_str::<Resources>("cpu: -0.5\nmemory: 1Gi\n").is_err());

        let decimal: Resources = serde_yaml::from_str("cpu: 1.5\nmemory: 1.5Gi\n").expect("cannot deserialize decimals");
        assert_eq!(decimal.cpu.as_milli_cpu(), 1500);
        assert_eq!(decimal.memory.as_bytes(), 1_610_612_736);
    }
}
