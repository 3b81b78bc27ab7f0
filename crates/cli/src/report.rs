use anyhow::{Context, Result};
use blast_radius_core::{
    module_relative, AffectedReport, Cause, DependencyMap, FullMapReport, Service,
};
use clap::ValueEnum;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AffectedFormat {
    /// One affected service per line.
    List,
    Json,
    /// Services with their causes, then services grouped by cause.
    Detail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MapFormat {
    Json,
    Detail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ServicesFormat {
    List,
    Json,
}

/// Display settings shared by all renderers.
#[derive(Debug, Clone)]
pub struct ReportOptions {
    pub module: String,
    pub full_paths: bool,
    pub direct_label: String,
}

impl ReportOptions {
    pub fn new(module: impl Into<String>, full_paths: bool) -> Self {
        Self {
            module: module.into(),
            full_paths,
            direct_label: "(direct change)".to_string(),
        }
    }

    fn package<'a>(&self, package: &'a str) -> &'a str {
        if self.full_paths {
            package
        } else {
            match module_relative(&self.module, package) {
                "" => package,
                relative => relative,
            }
        }
    }

    fn cause(&self, cause: &Cause) -> String {
        match cause.package() {
            Some(pkg) => self.package(pkg).to_string(),
            None => self.direct_label.clone(),
        }
    }
}

#[derive(Serialize)]
struct AffectedJson<'a> {
    module: &'a str,
    #[serde(rename = "changedPackages")]
    changed_packages: Vec<&'a str>,
    affected: Vec<AffectedServiceJson>,
}

#[derive(Serialize)]
struct AffectedServiceJson {
    service: String,
    causes: Vec<String>,
}

#[derive(Serialize)]
struct FullMapJson<'a> {
    module: &'a str,
    fingerprint: String,
    services: BTreeMap<&'a str, Vec<&'a str>>,
    reverse: BTreeMap<&'a str, ReverseJson<'a>>,
}

#[derive(Serialize)]
struct ReverseJson<'a> {
    consumers: Vec<&'a str>,
    count: usize,
}

pub fn write_affected<W: Write>(
    writer: &mut W,
    report: &AffectedReport,
    format: AffectedFormat,
    opts: &ReportOptions,
) -> Result<()> {
    match format {
        AffectedFormat::List => {
            for service in report.impact.services() {
                writeln!(writer, "{service}").context("failed to write affected service")?;
            }
        }
        AffectedFormat::Json => {
            let body = AffectedJson {
                module: &report.module,
                changed_packages: report
                    .changes
                    .packages
                    .iter()
                    .map(|p| opts.package(p))
                    .collect(),
                affected: report
                    .impact
                    .affected
                    .iter()
                    .map(|(service, causes)| AffectedServiceJson {
                        service: service.clone(),
                        causes: causes.iter().map(|c| opts.cause(c)).collect(),
                    })
                    .collect(),
            };
            serde_json::to_writer_pretty(&mut *writer, &body)
                .context("failed to write affected JSON")?;
            writeln!(writer)?;
        }
        AffectedFormat::Detail => write_affected_detail(writer, report, opts)?,
    }
    Ok(())
}

fn write_affected_detail<W: Write>(
    writer: &mut W,
    report: &AffectedReport,
    opts: &ReportOptions,
) -> Result<()> {
    if report.impact.is_empty() {
        writeln!(writer, "no services affected")?;
        return Ok(());
    }

    for (service, causes) in &report.impact.affected {
        writeln!(writer, "{service}")?;
        for cause in causes {
            writeln!(writer, "  <- {}", opts.cause(cause))?;
        }
    }

    writeln!(writer)?;
    writeln!(writer, "by change:")?;
    for (cause, services) in report.impact.by_cause() {
        writeln!(writer, "  {}: {}", opts.cause(&cause), services.join(", "))?;
    }
    Ok(())
}

pub fn write_full_map<W: Write>(
    writer: &mut W,
    report: &FullMapReport,
    format: MapFormat,
    opts: &ReportOptions,
) -> Result<()> {
    let fingerprint = fingerprint(&report.map.forward);
    match format {
        MapFormat::Json => {
            let body = FullMapJson {
                module: &report.module,
                fingerprint,
                services: report
                    .map
                    .forward
                    .iter()
                    .map(|(service, deps)| {
                        (
                            service.as_str(),
                            deps.iter().map(|d| opts.package(d)).collect(),
                        )
                    })
                    .collect(),
                reverse: report
                    .map
                    .reverse
                    .iter()
                    .map(|(pkg, entry)| {
                        (
                            opts.package(pkg),
                            ReverseJson {
                                consumers: entry.consumers.iter().map(String::as_str).collect(),
                                count: entry.count,
                            },
                        )
                    })
                    .collect(),
            };
            serde_json::to_writer_pretty(&mut *writer, &body)
                .context("failed to write full map JSON")?;
            writeln!(writer)?;
        }
        MapFormat::Detail => {
            writeln!(writer, "services:")?;
            for (service, deps) in &report.map.forward {
                writeln!(writer, "  {service} ({})", deps.len())?;
                for dep in deps {
                    writeln!(writer, "    {}", opts.package(dep))?;
                }
            }
            writeln!(writer, "shared packages:")?;
            for (pkg, entry) in &report.map.reverse {
                let consumers: Vec<&str> = entry.consumers.iter().map(String::as_str).collect();
                writeln!(
                    writer,
                    "  {} ({}): {}",
                    opts.package(pkg),
                    entry.count,
                    consumers.join(", ")
                )?;
            }
            writeln!(writer, "fingerprint: {fingerprint}")?;
        }
    }
    Ok(())
}

pub fn write_services<W: Write>(
    writer: &mut W,
    services: &[Service],
    format: ServicesFormat,
) -> Result<()> {
    match format {
        ServicesFormat::List => {
            for service in services {
                writeln!(writer, "{}\t{}", service.name, service.root)?;
            }
        }
        ServicesFormat::Json => {
            serde_json::to_writer_pretty(&mut *writer, services)
                .context("failed to write services JSON")?;
            writeln!(writer)?;
        }
    }
    Ok(())
}

/// SHA-256 over the sorted `service<TAB>package` lines of the forward map.
pub fn fingerprint(map: &DependencyMap) -> String {
    let mut hasher = Sha256::new();
    for (service, deps) in map {
        hasher.update(service.as_bytes());
        hasher.update(b"\n");
        for dep in deps {
            hasher.update(b"\t");
            hasher.update(dep.as_bytes());
            hasher.update(b"\n");
        }
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use blast_radius_core::{ChangeSet, FullMap, ImpactResult, ReverseEntry};
    use std::collections::BTreeSet;

    const MODULE: &str = "example.com/mono";

    fn affected_report() -> AffectedReport {
        let mut impact = ImpactResult::default();
        impact.affected.insert(
            "orders".into(),
            BTreeSet::from([Cause::Package(format!("{MODULE}/shared/models"))]),
        );
        impact
            .affected
            .insert("billing".into(), BTreeSet::from([Cause::Direct]));
        AffectedReport {
            module: MODULE.into(),
            changes: ChangeSet {
                packages: BTreeSet::from([format!("{MODULE}/shared/models")]),
                files: vec!["services/billing/handler.go".into()],
            },
            impact,
            warnings: Vec::new(),
        }
    }

    fn render(format: AffectedFormat, full_paths: bool) -> String {
        let mut out = Vec::new();
        write_affected(
            &mut out,
            &affected_report(),
            format,
            &ReportOptions::new(MODULE, full_paths),
        )
        .unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn list_is_sorted_service_names() {
        assert_eq!(render(AffectedFormat::List, false), "billing\norders\n");
    }

    #[test]
    fn json_strips_module_prefix_unless_asked() {
        let short: serde_json::Value =
            serde_json::from_str(&render(AffectedFormat::Json, false)).unwrap();
        assert_eq!(short["changedPackages"][0], "shared/models");
        assert_eq!(short["affected"][0]["service"], "billing");
        assert_eq!(short["affected"][0]["causes"][0], "(direct change)");

        let full: serde_json::Value =
            serde_json::from_str(&render(AffectedFormat::Json, true)).unwrap();
        assert_eq!(full["affected"][1]["causes"][0], format!("{MODULE}/shared/models"));
    }

    #[test]
    fn detail_groups_by_cause() {
        let out = render(AffectedFormat::Detail, false);
        assert!(out.contains("orders\n  <- shared/models\n"));
        assert!(out.contains("by change:\n  (direct change): billing\n  shared/models: orders\n"));
    }

    #[test]
    fn fingerprint_is_stable_and_sensitive() {
        let mut map = DependencyMap::new();
        map.insert("orders".into(), BTreeSet::from(["m/shared/a".to_string()]));
        let first = fingerprint(&map);
        assert_eq!(first, fingerprint(&map.clone()));
        assert_eq!(first.len(), 64);

        map.get_mut("orders").unwrap().insert("m/shared/b".into());
        assert_ne!(first, fingerprint(&map));
    }

    #[test]
    fn full_map_detail_lists_consumer_counts() {
        let forward = DependencyMap::from([
            ("billing".to_string(), BTreeSet::from([format!("{MODULE}/shared/models")])),
            ("orders".to_string(), BTreeSet::from([format!("{MODULE}/shared/models")])),
        ]);
        let reverse = BTreeMap::from([(
            format!("{MODULE}/shared/models"),
            ReverseEntry {
                consumers: BTreeSet::from(["billing".to_string(), "orders".to_string()]),
                count: 2,
            },
        )]);
        let report = FullMapReport {
            module: MODULE.into(),
            map: FullMap { forward, reverse },
            warnings: Vec::new(),
        };

        let mut out = Vec::new();
        write_full_map(
            &mut out,
            &report,
            MapFormat::Detail,
            &ReportOptions::new(MODULE, false),
        )
        .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("  shared/models (2): billing, orders\n"));
        assert!(text.contains("fingerprint: "));
    }
}
