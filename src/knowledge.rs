//! Kernel domain knowledge.
//!
//! Two read-only tables: framework structure type → callback field →
//! (trigger, execution context), and async mechanism → execution context.
//! A knowledge base is loaded from JSON or YAML, or taken from the built-in
//! defaults, and shared through `Arc` while analyses run.
//!
//! Accepted document shapes:
//!
//! ```json
//! {
//!   "frameworks": {
//!     "usb_driver": {
//!       "callbacks": { "probe": { "trigger": "...", "context": "process" } }
//!     }
//!   },
//!   "async_mechanisms": { "work": "process" }
//! }
//! ```
//!
//! and the flat form `{"usb_driver": {"entry_points": {"probe": {...}}}}`.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use phf::phf_map;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AnalysisError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackInfo {
    #[serde(default)]
    pub trigger: String,
    #[serde(default)]
    pub context: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameworkEntry {
    #[serde(default, alias = "entry_points")]
    pub callbacks: BTreeMap<String, CallbackInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KnowledgeBase {
    #[serde(default)]
    frameworks: BTreeMap<String, FrameworkEntry>,
    #[serde(default)]
    async_mechanisms: BTreeMap<String, String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Document {
    Structured(KnowledgeBase),
    Flat(BTreeMap<String, FrameworkEntry>),
}

impl From<Document> for KnowledgeBase {
    fn from(doc: Document) -> Self {
        let kb = match doc {
            Document::Structured(kb) => kb,
            Document::Flat(frameworks) => KnowledgeBase {
                frameworks,
                async_mechanisms: BTreeMap::new(),
            },
        };
        kb.normalized()
    }
}

/// (field, trigger, context) triples per framework type.
type CallbackTable = &'static [(&'static str, &'static str, &'static str)];

static BUILTIN_FRAMEWORKS: phf::Map<&'static str, CallbackTable> = phf_map! {
    "usb_driver" => &[
        ("probe", "USB core matched an interface against id_table", "process"),
        ("disconnect", "interface removed or driver unbound", "process"),
        ("suspend", "system or runtime suspend", "process"),
        ("resume", "system or runtime resume", "process"),
        ("reset_resume", "resume after the device was reset", "process"),
        ("pre_reset", "usb_reset_device() about to reset", "process"),
        ("post_reset", "usb_reset_device() finished", "process"),
    ],
    "platform_driver" => &[
        ("probe", "platform bus matched a device", "process"),
        ("remove", "device removed or driver unbound", "process"),
        ("shutdown", "system shutdown", "process"),
        ("suspend", "legacy system suspend", "process"),
        ("resume", "legacy system resume", "process"),
    ],
    "pci_driver" => &[
        ("probe", "PCI core matched a device against id_table", "process"),
        ("remove", "device removed or driver unbound", "process"),
        ("shutdown", "system shutdown", "process"),
        ("sriov_configure", "sysfs sriov_numvfs write", "process"),
    ],
    "i2c_driver" => &[
        ("probe", "I2C core matched a client", "process"),
        ("remove", "client removed or driver unbound", "process"),
        ("shutdown", "system shutdown", "process"),
        ("alert", "SMBus alert", "process"),
    ],
    "spi_driver" => &[
        ("probe", "SPI core matched a device", "process"),
        ("remove", "device removed or driver unbound", "process"),
        ("shutdown", "system shutdown", "process"),
    ],
    "file_operations" => &[
        ("open", "open(2) on the device node", "process"),
        ("release", "last close(2) of the file", "process"),
        ("read", "read(2)", "process"),
        ("write", "write(2)", "process"),
        ("unlocked_ioctl", "ioctl(2)", "process"),
        ("compat_ioctl", "32-bit ioctl(2) on a 64-bit kernel", "process"),
        ("mmap", "mmap(2)", "process"),
        ("poll", "poll(2) / select(2) / epoll", "process"),
        ("llseek", "lseek(2)", "process"),
        ("fasync", "fcntl(F_SETFL, O_ASYNC)", "process"),
        ("flush", "close(2) of each file descriptor", "process"),
    ],
    "net_device_ops" => &[
        ("ndo_open", "interface brought up", "process"),
        ("ndo_stop", "interface brought down", "process"),
        ("ndo_start_xmit", "packet queued for transmission", "softirq"),
        ("ndo_tx_timeout", "transmit watchdog expired", "softirq"),
        ("ndo_get_stats64", "statistics read", "process"),
    ],
    "module" => &[
        ("init", "module load (insmod / modprobe / boot)", "process"),
        ("exit", "module unload (rmmod)", "process"),
    ],
};

static BUILTIN_MECHANISMS: phf::Map<&'static str, &'static str> = phf_map! {
    "work" => "process",
    "delayed_work" => "process",
    "tasklet" => "softirq",
    "timer" => "softirq",
    "hrtimer" => "hardirq",
    "irq" => "hardirq",
    "threaded_irq" => "process",
    "kthread" => "process",
};

impl KnowledgeBase {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Tables for common kernel frameworks and every async mechanism.
    pub fn builtin() -> Self {
        let frameworks = BUILTIN_FRAMEWORKS
            .entries()
            .map(|(ty, table)| {
                let callbacks = table
                    .iter()
                    .map(|(field, trigger, context)| {
                        (
                            field.to_string(),
                            CallbackInfo {
                                trigger: trigger.to_string(),
                                context: context.to_string(),
                            },
                        )
                    })
                    .collect();
                (ty.to_string(), FrameworkEntry { callbacks })
            })
            .collect();
        let async_mechanisms = BUILTIN_MECHANISMS
            .entries()
            .map(|(id, ctx)| (id.to_string(), ctx.to_string()))
            .collect();
        Self {
            frameworks,
            async_mechanisms,
        }
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str::<Document>(text)
            .map(Self::from)
            .map_err(|e| AnalysisError::KnowledgeBase(e.to_string()))
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        serde_yaml::from_str::<Document>(text)
            .map(Self::from)
            .map_err(|e| AnalysisError::KnowledgeBase(e.to_string()))
    }

    /// Load a document; `.yaml`/`.yml` files are YAML, anything else JSON.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| AnalysisError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        let parsed = if is_yaml {
            serde_yaml::from_str::<Document>(&text).map_err(|e| e.to_string())
        } else {
            serde_json::from_str::<Document>(&text).map_err(|e| e.to_string())
        };
        let kb = parsed
            .map(Self::from)
            .map_err(|e| AnalysisError::KnowledgeBase(format!("{}: {}", path.display(), e)))?;
        debug!(
            path = %path.display(),
            frameworks = kb.frameworks.len(),
            mechanisms = kb.async_mechanisms.len(),
            "loaded knowledge base"
        );
        Ok(kb)
    }

    /// `self` layered over `base`: entries of `self` win field by field.
    pub fn merged_over(mut self, base: &KnowledgeBase) -> Self {
        for (ty, entry) in &base.frameworks {
            let own = self.frameworks.entry(ty.clone()).or_default();
            for (field, info) in &entry.callbacks {
                own.callbacks.entry(field.clone()).or_insert_with(|| info.clone());
            }
        }
        for (id, ctx) in &base.async_mechanisms {
            self.async_mechanisms.entry(id.clone()).or_insert_with(|| ctx.clone());
        }
        self
    }

    /// Keys are bare type names; `struct usb_driver` is accepted on input.
    fn normalized(self) -> Self {
        let frameworks = self
            .frameworks
            .into_iter()
            .map(|(ty, entry)| {
                let ty = ty.trim();
                let ty = ty.strip_prefix("struct ").unwrap_or(ty).trim().to_string();
                (ty, entry)
            })
            .collect();
        Self {
            frameworks,
            async_mechanisms: self.async_mechanisms,
        }
    }

    pub fn framework(&self, ty: &str) -> Option<&FrameworkEntry> {
        self.frameworks.get(ty)
    }

    pub fn knows_framework(&self, ty: &str) -> bool {
        self.frameworks.contains_key(ty)
    }

    pub fn callback(&self, ty: &str, field: &str) -> Option<&CallbackInfo> {
        self.frameworks.get(ty)?.callbacks.get(field)
    }

    pub fn mechanism_context(&self, id: &str) -> Option<&str> {
        self.async_mechanisms.get(id).map(String::as_str)
    }

    pub fn frameworks(&self) -> impl Iterator<Item = (&str, &FrameworkEntry)> {
        self.frameworks.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.frameworks.is_empty() && self.async_mechanisms.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_builtin_tables() {
        let kb = KnowledgeBase::builtin();
        assert_eq!(kb.callback("usb_driver", "probe").unwrap().context, "process");
        assert_eq!(kb.mechanism_context("tasklet"), Some("softirq"));
        assert!(kb.knows_framework("file_operations"));
        assert!(!kb.knows_framework("acme_ops"));
    }

    #[test]
    fn test_structured_json() {
        let kb = KnowledgeBase::from_json_str(
            r#"{
                "frameworks": {
                    "struct acme_ops": {
                        "callbacks": { "start": { "trigger": "acme core start", "context": "process" } }
                    }
                },
                "async_mechanisms": { "work": "process, may sleep" }
            }"#,
        )
        .unwrap();
        assert_eq!(kb.callback("acme_ops", "start").unwrap().trigger, "acme core start");
        assert_eq!(kb.mechanism_context("work"), Some("process, may sleep"));
        assert_eq!(kb.mechanism_context("tasklet"), None);
    }

    #[test]
    fn test_flat_document() {
        let kb = KnowledgeBase::from_json_str(
            r#"{ "usb_driver": { "entry_points": { "probe": { "trigger": "device plugged" } } } }"#,
        )
        .unwrap();
        let probe = kb.callback("usb_driver", "probe").unwrap();
        assert_eq!(probe.trigger, "device plugged");
        assert_eq!(probe.context, "");
    }

    #[test]
    fn test_invalid_document() {
        let err = KnowledgeBase::from_json_str("[1, 2]").unwrap_err();
        assert!(matches!(err, AnalysisError::KnowledgeBase(_)));
    }

    #[test]
    fn test_yaml_file_and_merge() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "frameworks:\n  usb_driver:\n    callbacks:\n      probe:\n        trigger: custom\n        context: custom-ctx\nasync_mechanisms:\n  irq: hard interrupt"
        )
        .unwrap();
        let kb = KnowledgeBase::from_path(file.path())
            .unwrap()
            .merged_over(&KnowledgeBase::builtin());
        assert_eq!(kb.callback("usb_driver", "probe").unwrap().context, "custom-ctx");
        assert_eq!(kb.callback("usb_driver", "disconnect").unwrap().context, "process");
        assert_eq!(kb.mechanism_context("irq"), Some("hard interrupt"));
        assert_eq!(kb.mechanism_context("work"), Some("process"));
    }

    #[test]
    fn test_missing_file() {
        let err = KnowledgeBase::from_path("/nonexistent/kb.json").unwrap_err();
        assert!(matches!(err, AnalysisError::Io { .. }));
    }
}
