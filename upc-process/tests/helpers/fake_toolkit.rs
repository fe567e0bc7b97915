//! Scripted stand-in for the image-processing toolkit
//!
//! Each step writes the file a real program would (cube label or report) and
//! the run fails at a chosen step. Programs run are recorded in order.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use upc_process::executor::{StepError, StepExecutor, StepInvocation};
use upc_process::recipe::StepKind;

/// Toolkit identifier reported for every converted cube
pub const SERIAL: &str = "MRO/CTX/0906567432:152";

/// Source files whose stem starts with this get a target missing from `targets`
pub const UNKNOWN_TARGET_PREFIX: &str = "unknown_target";

#[derive(Debug, Clone)]
pub enum BandFixture {
    /// `FilterName = (a, b, …)` with one center per filter
    List(Vec<(&'static str, f64)>),
    /// `FilterName = a`, `Center = c <micrometers>`
    Scalar(&'static str, f64),
    /// No BandBin group
    Missing,
}

pub struct FakeToolkit {
    fail_on: Option<String>,
    bands: BandFixture,
    executed: Mutex<Vec<String>>,
    target: Mutex<String>,
    /// Report keywords left out of the written report
    omitted: Vec<&'static str>,
}

impl FakeToolkit {
    pub fn new() -> Self {
        Self {
            fail_on: None,
            bands: BandFixture::List(vec![("BLUE", 0.5), ("RED", 0.65), ("NIR", 0.9)]),
            executed: Mutex::new(Vec::new()),
            target: Mutex::new("Mars".to_string()),
            omitted: Vec::new(),
        }
    }

    pub fn failing_on(step: &str) -> Self {
        Self {
            fail_on: Some(step.to_string()),
            ..Self::new()
        }
    }

    pub fn with_bands(mut self, bands: BandFixture) -> Self {
        self.bands = bands;
        self
    }

    /// Write reports without these keywords
    pub fn omitting(mut self, keys: &[&'static str]) -> Self {
        self.omitted.extend_from_slice(keys);
        self
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    fn cube_label(&self) -> String {
        let target = self.target.lock().unwrap().clone();
        let bandbin = match &self.bands {
            BandFixture::List(bands) => {
                let names: Vec<_> = bands.iter().map(|(n, _)| n.to_string()).collect();
                let centers: Vec<_> = bands.iter().map(|(_, c)| format!("{:?}", c)).collect();
                format!(
                    "  Group = BandBin\n    FilterName = ({})\n    Center = ({}) <micrometers>\n  End_Group\n",
                    names.join(", "),
                    centers.join(", ")
                )
            }
            BandFixture::Scalar(name, center) => format!(
                "  Group = BandBin\n    FilterName = {}\n    Center = {:?} <micrometers>\n  End_Group\n",
                name, center
            ),
            BandFixture::Missing => String::new(),
        };

        format!(
            r#"Object = IsisCube
  Object = Core
    StartByte = 65537
  End_Object

  Group = Instrument
    SpacecraftName = "MARS RECONNAISSANCE ORBITER"
    InstrumentId = CTX
    TargetName = {target}
    StartTime = 2008-01-14T22:05:34.123
    StopTime = 2008-01-14T22:05:52.123
  End_Group

  Group = Archive
    ProductId = P01_001
  End_Group
{bandbin}End_Object
End
"#
        )
    }

    fn report_label(&self) -> String {
        let target = self.target.lock().unwrap().clone();
        let full = format!(
            r#"Object = Caminfo
  Object = Parameters
    IsisId = "{SERIAL}"
    ProductId = P01_001
    TargetName = {target}
    InstrumentId = CTX
    StartTime = 2008-01-14T22:05:34.123
    SpacecraftClockCount = "0906567432:152"
    PixelResolution = 5.9 <meters>
    Lines = 1024
    CentroidLongitude = 354.25
    CentroidLatitude = -4.5
  End_Object

  Object = Polygon
    GisFootprint = "MULTIPOLYGON (((354 -4, 355 -4, 355 -5, 354 -4)))"
  End_Object
End_Object
End
"#
        );
        full.lines()
            .filter(|line| {
                let key = line.trim_start();
                !self.omitted.iter().any(|omit| key.starts_with(&format!("{} =", omit)))
            })
            .map(|line| format!("{}\n", line))
            .collect()
    }

    fn write(&self, path: &Path, text: &str) -> Result<(), StepError> {
        std::fs::write(path, text).map_err(|e| StepError::ExecutionFailed {
            program: "fake".into(),
            reason: e.to_string(),
        })
    }
}

fn framelet(to: &str, parity: &str) -> PathBuf {
    PathBuf::from(format!("{}.raw.{}.cub", to.trim_end_matches(".cub"), parity))
}

#[async_trait]
impl StepExecutor for FakeToolkit {
    async fn execute(&self, invocation: &StepInvocation) -> Result<(), StepError> {
        self.executed.lock().unwrap().push(invocation.program.clone());

        if self.fail_on.as_deref() == Some(invocation.program.as_str()) {
            return Err(StepError::NonZeroExit {
                step: invocation.program.clone(),
                code: Some(1),
                stderr: "**ERROR** scripted failure".into(),
            });
        }

        let kind = StepKind::classify(&invocation.program);
        if kind.is_early_stage() {
            let from = invocation.parameter("from_").unwrap_or_default();
            let stem = Path::new(from)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let target = if stem.starts_with(UNKNOWN_TARGET_PREFIX) {
                "Phobos"
            } else {
                "Mars"
            };
            *self.target.lock().unwrap() = target.into();
        }

        match kind {
            StepKind::ThemisProc => {
                let to = invocation.parameter("to").unwrap_or_default().to_string();
                let label = self.cube_label();
                self.write(&framelet(&to, "odd"), &label)?;
                self.write(&framelet(&to, "even"), &label)?;
            }
            StepKind::MosaicMerge => {
                let mosaic = PathBuf::from(invocation.parameter("mosaic").unwrap_or_default());
                self.write(&mosaic, &self.cube_label())?;
            }
            StepKind::Report => {
                let to = PathBuf::from(invocation.parameter("to").unwrap_or_default());
                self.write(&to, &self.report_label())?;
            }
            _ => {
                if let Some(to) = invocation.parameter("to") {
                    self.write(Path::new(to), &self.cube_label())?;
                }
            }
        }
        Ok(())
    }

    async fn serial_number(&self, cube: &Path) -> Result<String, StepError> {
        if cube.exists() {
            Ok(format!("{}\n", SERIAL))
        } else {
            Err(StepError::NonZeroExit {
                step: "getsn".into(),
                code: Some(1),
                stderr: format!("Unable to open [{}]", cube.display()),
            })
        }
    }
}
