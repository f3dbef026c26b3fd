//! Arena owning every data point, job and purge task
//!
//! Jobs and purges refer to data points by index, so the manager, the
//! workers and the scheduler share one immutable topology and no component
//! holds a pointer back into another.

use crate::config::AggregatorConfig;
use crate::datapoint::DataPoint;
use crate::error::AggregatorResult;
use crate::job::Job;
use crate::purge::PurgeTask;
use rustc_hash::FxHashMap;

/// Flat topology built once from configuration
#[derive(Debug)]
pub struct Registry {
    data_points: Vec<DataPoint>,
    jobs: Vec<Job>,
    purges: Vec<PurgeTask>,
    jobs_by_topic: FxHashMap<String, usize>,
}

impl Registry {
    /// Build the arena; jobs are allocated here and reused every cycle
    pub fn build(config: &AggregatorConfig) -> AggregatorResult<Self> {
        let data_points = config
            .data_points
            .iter()
            .map(|dp| DataPoint::from_config(dp, config.max_samples_per_data_point))
            .collect::<AggregatorResult<Vec<_>>>()?;

        let mut jobs = Vec::with_capacity(config.job_count());
        for (dp_index, data_point) in data_points.iter().enumerate() {
            for (method_index, method) in data_point.methods().iter().enumerate() {
                jobs.push(Job::new(dp_index, method_index, method.output_topic()));
            }
        }

        let purges = data_points
            .iter()
            .enumerate()
            .map(|(index, dp)| PurgeTask::for_data_point(index, dp))
            .collect();

        let jobs_by_topic = jobs
            .iter()
            .enumerate()
            .map(|(index, job)| (job.output_topic().to_string(), index))
            .collect();

        Ok(Self {
            data_points,
            jobs,
            purges,
            jobs_by_topic,
        })
    }

    pub fn data_points(&self) -> &[DataPoint] {
        &self.data_points
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn purges(&self) -> &[PurgeTask] {
        &self.purges
    }

    /// Job publishing to `output_topic`
    pub fn job_for_topic(&self, output_topic: &str) -> Option<&Job> {
        self.jobs_by_topic
            .get(output_topic)
            .and_then(|&index| self.jobs.get(index))
    }

    /// Forget queued tickets, e.g. after a stop discarded the queue
    pub(crate) fn clear_pending(&self) {
        for job in &self.jobs {
            job.clear_pending();
        }
    }
}
