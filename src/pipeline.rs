//! End-to-end correction run: load, de-jitter, optional gap-fill, save.

use anyhow::Result;
use log::info;
use serde::Serialize;

use crate::config::CorrectionConfig;
use crate::jitter::correct_jitter;
use crate::report::{JitterReport, ZeroReport};
use crate::traits::{SequenceSink, SequenceSource};
use crate::zeros::correct_zeros;

/// What a pipeline run did, in the order the passes ran.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct PipelineReport {
    pub name: Option<String>,
    pub poses: usize,
    pub joints: usize,
    pub jitter: JitterReport,
    /// Separate gap-fill pass, when enabled
    pub zeros: Option<ZeroReport>,
}

pub struct CorrectionPipeline<S, K>
where
    S: SequenceSource,
    K: SequenceSink,
{
    source: S,
    sink: K,
    config: CorrectionConfig,
}

impl<S, K> CorrectionPipeline<S, K>
where
    S: SequenceSource,
    K: SequenceSink,
{
    pub fn new(source: S, sink: K, config: CorrectionConfig) -> Self {
        CorrectionPipeline {
            source,
            sink,
            config,
        }
    }

    pub fn config(&self) -> &CorrectionConfig {
        &self.config
    }

    pub fn run(&mut self) -> Result<PipelineReport> {
        // Bad parameters fail before the input is even read
        self.config.validate()?;

        let input = self.source.load()?;
        info!(
            "[Pipeline] Loaded {} poses x {} joints ({:.2} s)",
            input.len(),
            input.joint_count(),
            input.duration()
        );

        let (mut output, jitter) = correct_jitter(&input, &self.config.jitter)?;

        let mut zeros = None;
        if self.config.zeros.enabled {
            let (rebuilt, report) = correct_zeros(&output, &self.config.zeros)?;
            let rebuilt = rebuilt.into_owned();
            if report.rebuilt {
                info!(
                    "[Pipeline] Gap-fill repaired {} origin cell(s) ({:.1}%)",
                    report.origin_cells,
                    report.percentage()
                );
            }
            output = rebuilt;
            zeros = Some(report);
        }

        self.sink.save(&output)?;
        info!(
            "[Pipeline] Saved {}: {} point(s) realigned ({:.1}%), {} jump(s), {} twitch(es)",
            output.name().unwrap_or("sequence"),
            jitter.realigned_points,
            jitter.percentage(),
            jitter.jumps,
            jitter.twitches
        );

        Ok(PipelineReport {
            name: output.name().map(str::to_string),
            poses: output.len(),
            joints: output.joint_count(),
            jitter,
            zeros,
        })
    }
}
