//! Persistence Layer
//!
//! Writes the outcome of one item's run into the UPC database and its audit
//! row into the PDS database.
//!
//! # Success path
//! Identity row keyed by the toolkit identifier, band rows, common and archive
//! keywords, centroid/footprint geometry, source checksum, `error = false`,
//! audit `true`. Committed in phases; a crash between phases leaves partial
//! metadata that the next run overwrites.
//!
//! # Failure path
//! Early-stage failures (before a toolkit identifier exists) are keyed by the
//! source URL; later failures by the identifier of the partial cube. Both
//! write the error rows and sentinel geometry, then audit `false`.
//!
//! Individual row failures are logged and skipped, never retried.

use crate::config::UpcConfig;
use crate::db::{datafiles, metadata, process_runs, reference, MetaValue, NewDataFile};
use crate::error::{ProcessError, ProcessResult};
use crate::keywords::ExtractedValue;
use crate::label::{Label, LabelError, LabelValue};
use crate::models::WorkItem;
use crate::runner::{PipelineRun, StepFailure};
use crate::services::checksum::file_checksum;
use crate::workspace::WorkArea;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, error, info, warn};
use upc_common::time;

/// Out-of-domain point written when geometry could not be computed
pub const SENTINEL_GEOMETRY: &str = "POINT(361 0)";

const GEOMETRY_TABLE: &str = "meta_geometries";
const STRING_TABLE: &str = "meta_strings";

/// Bookkeeping keyword names
pub mod keyword {
    pub const PROCESS_DATE: &str = "processdate";
    pub const ERROR_TYPE: &str = "errortype";
    pub const ERROR_MESSAGE: &str = "errormessage";
    pub const ERROR_FLAG: &str = "error";
    pub const FOOTPRINT: &str = "isisfootprint";
    pub const CENTROID: &str = "isiscentroid";
    pub const START_TIME: &str = "starttime";
    pub const STOP_TIME: &str = "stoptime";
    pub const CHECKSUM: &str = "checksum";
}

/// Identity of the item being persisted
pub struct ItemContext<'a> {
    pub item: &'a WorkItem,
    /// Canonical public URL of the source file
    pub source_url: String,
    pub area: &'a WorkArea,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PersistOutcome {
    /// Rows written for `upcid`; `success` mirrors the audit outcome
    Recorded { upcid: i64, success: bool },
    /// Nothing written: identity row could not be built
    Abandoned { reason: String },
}

pub struct Persistence {
    upc: SqlitePool,
    pds: SqlitePool,
}

impl Persistence {
    pub fn new(upc: SqlitePool, pds: SqlitePool) -> Self {
        Self { upc, pds }
    }

    /// Record a completed run from its report label
    pub async fn record_success(
        &self,
        config: &UpcConfig,
        ctx: &ItemContext<'_>,
        run: &PipelineRun,
        report: &Label,
    ) -> ProcessResult<PersistOutcome> {
        let isisid = required_text(report, "IsisId")?;
        let target_name = required_text(report, "TargetName")?.to_uppercase();
        let instrument = required_text(report, "InstrumentId")?;

        // Phase 1: identity and bands
        let mut tx = self.upc.begin().await?;
        let (target_id, instrument_id) =
            match resolve_references(&mut tx, &target_name, &instrument).await? {
                Some(ids) => ids,
                None => {
                    return Err(ProcessError::ReferenceMissing(format!(
                        "target '{}' / instrument '{}'",
                        target_name, instrument
                    )))
                }
            };

        let upcid = datafiles::ensure_by_isisid(
            &mut tx,
            &NewDataFile {
                isisid: Some(isisid.clone()),
                productid: report.find_value("ProductId").map(|v| v.to_string()),
                edr_source: ctx.source_url.clone(),
                instrumentid: Some(instrument_id),
                targetid: Some(target_id),
            },
        )
        .await?;

        match &run.bands {
            Some(bands) => {
                for (filter, center) in bands.rows() {
                    if let Err(e) = metadata::upsert_band(&mut tx, upcid, &filter, center).await {
                        error!(upcid, filter = %filter, error = %e, "Failed to store band");
                    }
                }
            }
            None => debug!(upcid, "No band metadata cached"),
        }
        tx.commit().await?;

        // Phase 2: common keywords
        let common = config.catalog.extract_common(report);
        self.store_values(upcid, &common).await?;

        // Phase 3: archive keywords
        let archive = config
            .catalog
            .extract_archive(report, &ctx.item.archive, instrument_id);
        self.store_values(upcid, &archive).await?;

        // Phase 4: geometry
        let mut tx = self.upc.begin().await?;
        match centroid(report) {
            Some(point) => {
                upsert_fixed(&mut tx, config, upcid, keyword::CENTROID, MetaValue::Geometry(point)).await
            }
            None => {
                warn!(upcid, "Report has no centroid coordinates");
                clear_fixed(&mut tx, config, upcid, keyword::CENTROID, GEOMETRY_TABLE).await
            }
        }
        match report.find_value("GisFootprint") {
            Some(footprint) => {
                upsert_fixed(
                    &mut tx,
                    config,
                    upcid,
                    keyword::FOOTPRINT,
                    MetaValue::Geometry(footprint.to_string()),
                )
                .await
            }
            None => {
                warn!(upcid, "Report has no footprint");
                clear_fixed(&mut tx, config, upcid, keyword::FOOTPRINT, GEOMETRY_TABLE).await
            }
        }
        tx.commit().await?;

        // Phase 5: checksum, error flag, audit
        let mut tx = self.upc.begin().await?;
        match file_checksum(&ctx.item.source_path).await {
            Ok(checksum) => {
                upsert_fixed(&mut tx, config, upcid, keyword::CHECKSUM, MetaValue::String(checksum)).await
            }
            Err(e) => error!(
                file = %ctx.item.source_path.display(),
                error = %e,
                "Checksum failed"
            ),
        }
        upsert_fixed(&mut tx, config, upcid, keyword::ERROR_FLAG, MetaValue::Boolean(false)).await;
        // Error rows from an earlier failed run of the same file
        for name in [keyword::ERROR_TYPE, keyword::ERROR_MESSAGE] {
            clear_fixed(&mut tx, config, upcid, name, STRING_TABLE).await;
        }
        tx.commit().await?;

        self.audit(ctx.item.file_id, true).await;

        ctx.area.remove_file(&ctx.area.working_copy());
        ctx.area.remove_file(&ctx.area.report());

        info!(
            file = %ctx.item.source_path.display(),
            upcid,
            isisid = %isisid,
            keywords = common.len() + archive.len(),
            "Recorded successful run"
        );
        Ok(PersistOutcome::Recorded { upcid, success: true })
    }

    /// Record a failed run
    ///
    /// `serial` is the toolkit identifier of the partial cube, when one could
    /// be read; it is only consulted for late-stage failures.
    pub async fn record_failure(
        &self,
        config: &UpcConfig,
        ctx: &ItemContext<'_>,
        failure: &StepFailure,
        serial: Option<String>,
    ) -> ProcessResult<PersistOutcome> {
        let working = ctx.area.working_copy();
        let label = match Label::load(&working) {
            Ok(label) => Some(label),
            Err(e) => {
                debug!(file = %working.display(), error = %e, "No partial label");
                None
            }
        };

        let mut tx = self.upc.begin().await?;
        let upcid = if failure.kind.is_early_stage() {
            datafiles::ensure_by_source(&mut tx, &ctx.source_url).await?
        } else if let Some(serial) = serial {
            match datafiles::find_by_isisid(&mut tx, &serial).await? {
                Some(existing) => existing.upcid,
                None => match partial_identity(&mut tx, label.as_ref(), &serial, &ctx.source_url).await? {
                    Some(file) => datafiles::insert(&mut tx, &file).await?,
                    None => {
                        let reason = format!(
                            "target/instrument of {} not resolvable from partial label",
                            serial
                        );
                        warn!(
                            file = %ctx.item.source_path.display(),
                            step = %failure.step,
                            reason = %reason,
                            "Abandoning failed item"
                        );
                        ctx.area.remove_file(&working);
                        return Ok(PersistOutcome::Abandoned { reason });
                    }
                },
            }
        } else {
            warn!(
                file = %ctx.item.source_path.display(),
                step = %failure.step,
                "No toolkit identifier for late failure, keying by source URL"
            );
            datafiles::ensure_by_source(&mut tx, &ctx.source_url).await?
        };

        let message = format!(
            "Error running {} on file {}",
            failure.step,
            ctx.item.source_path.display()
        );
        let rows = [
            (keyword::PROCESS_DATE, MetaValue::Time(time::process_date())),
            (keyword::ERROR_TYPE, MetaValue::String(failure.step.clone())),
            (keyword::ERROR_MESSAGE, MetaValue::String(message)),
            (keyword::ERROR_FLAG, MetaValue::Boolean(true)),
            (keyword::FOOTPRINT, MetaValue::Geometry(SENTINEL_GEOMETRY.to_string())),
            (keyword::CENTROID, MetaValue::Geometry(SENTINEL_GEOMETRY.to_string())),
        ];
        for (name, value) in rows {
            upsert_fixed(&mut tx, config, upcid, name, value).await;
        }

        if let Some(label) = &label {
            for (name, key) in [(keyword::START_TIME, "StartTime"), (keyword::STOP_TIME, "StopTime")] {
                match label.value_at(&["IsisCube", "Instrument", key]) {
                    Some(value) => {
                        let value = MetaValue::Time(value.strip_units().to_string());
                        upsert_fixed(&mut tx, config, upcid, name, value).await
                    }
                    None => debug!(upcid, keyword = key, "Not in partial label"),
                }
            }
        }
        tx.commit().await?;

        self.audit(ctx.item.file_id, false).await;
        ctx.area.remove_file(&working);

        info!(
            file = %ctx.item.source_path.display(),
            upcid,
            step = %failure.step,
            "Recorded failed run"
        );
        Ok(PersistOutcome::Recorded { upcid, success: false })
    }

    async fn store_values(&self, upcid: i64, values: &[ExtractedValue]) -> ProcessResult<()> {
        let mut tx = self.upc.begin().await?;
        for value in values {
            if let Err(e) = metadata::upsert(&mut tx, upcid, value.typeid, &value.value).await {
                error!(
                    upcid,
                    keyword = %value.typename,
                    kind = %value.kind,
                    error = %e,
                    "Failed to store keyword"
                );
            }
        }
        tx.commit().await?;
        Ok(())
    }

    async fn audit(&self, file_id: i64, outcome: bool) {
        if let Err(e) = process_runs::record(&self.pds, file_id, outcome).await {
            error!(file_id, outcome, error = %e, "Failed to write audit row");
        }
    }
}

fn required_text(label: &Label, key: &str) -> Result<String, LabelError> {
    label
        .find_value(key)
        .map(|v| v.strip_units().to_string())
        .ok_or_else(|| LabelError::Missing(key.to_string()))
}

fn centroid(report: &Label) -> Option<String> {
    let lon = report.find_value("CentroidLongitude").and_then(LabelValue::as_f64)?;
    let lat = report.find_value("CentroidLatitude").and_then(LabelValue::as_f64)?;
    Some(format!("POINT ({} {})", lon, lat))
}

async fn resolve_references(
    conn: &mut SqliteConnection,
    target_name: &str,
    instrument: &str,
) -> sqlx::Result<Option<(i64, i64)>> {
    let target = reference::find_target_id(conn, target_name).await?;
    let instrument = reference::find_instrument_id(conn, instrument).await?;
    Ok(target.zip(instrument))
}

/// Identity row for a late failure, built from the partial cube label
async fn partial_identity(
    conn: &mut SqliteConnection,
    label: Option<&Label>,
    serial: &str,
    source_url: &str,
) -> sqlx::Result<Option<NewDataFile>> {
    let Some(label) = label else {
        return Ok(None);
    };
    let target = label.value_at(&["IsisCube", "Instrument", "TargetName"]);
    let instrument = label.value_at(&["IsisCube", "Instrument", "InstrumentId"]);
    let (Some(target), Some(instrument)) = (target, instrument) else {
        return Ok(None);
    };

    let target_name = target.strip_units().to_string().to_uppercase();
    let instrument = instrument.strip_units().to_string();
    let Some((target_id, instrument_id)) = resolve_references(conn, &target_name, &instrument).await? else {
        return Ok(None);
    };

    Ok(Some(NewDataFile {
        isisid: Some(serial.to_string()),
        productid: label
            .value_at(&["IsisCube", "Archive", "ProductId"])
            .map(|v| v.to_string()),
        edr_source: source_url.to_string(),
        instrumentid: Some(instrument_id),
        targetid: Some(target_id),
    }))
}

/// Drop a bookkeeping keyword's row so no stale value outlives this run
async fn clear_fixed(conn: &mut SqliteConnection, config: &UpcConfig, upcid: i64, name: &str, table: &str) {
    let Some(typeid) = config.catalog.fixed_typeid(name) else {
        return;
    };
    if let Err(e) = metadata::delete(conn, table, upcid, typeid).await {
        error!(upcid, keyword = %name, error = %e, "Failed to clear keyword");
    }
}

/// Upsert a bookkeeping keyword; a missing typeid or failed write is logged
async fn upsert_fixed(conn: &mut SqliteConnection, config: &UpcConfig, upcid: i64, name: &str, value: MetaValue) {
    let Some(typeid) = config.catalog.fixed_typeid(name) else {
        warn!(keyword = %name, "No keyword type row, value not stored");
        return;
    };
    if let Err(e) = metadata::upsert(conn, upcid, typeid, &value).await {
        error!(upcid, keyword = %name, error = %e, "Failed to store keyword");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_centroid_is_wkt_point() {
        let label = Label::parse(
            "Group = Polygon\n CentroidLongitude = 354.25 <degrees>\n CentroidLatitude = -4.5\nEnd_Group\nEnd",
        )
        .unwrap();
        assert_eq!(centroid(&label).as_deref(), Some("POINT (354.25 -4.5)"));
    }

    #[test]
    fn test_centroid_requires_both_coordinates() {
        let label = Label::parse("CentroidLongitude = 354.25\nEnd").unwrap();
        assert!(centroid(&label).is_none());
    }

    #[test]
    fn test_required_text_reports_missing_key() {
        let label = Label::parse("IsisId = \"MRO/CTX/1\"\nEnd").unwrap();
        assert_eq!(required_text(&label, "IsisId").unwrap(), "MRO/CTX/1");
        assert!(matches!(
            required_text(&label, "TargetName"),
            Err(LabelError::Missing(key)) if key == "TargetName"
        ));
    }
}
