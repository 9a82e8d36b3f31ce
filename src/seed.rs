//! Starter data for a fresh database: the four training batches, the common branches and a
//! few sample students.

use crate::error::Result;
use crate::manager::AttendanceManager;
use crate::models::NewStudent;
use tracing::info;

pub const BATCH_NAMES: [&str; 4] = ["Batch 1", "Batch 2", "Batch 3", "Batch 4"];

struct SampleStudent {
    full_name: &'static str,
    roll_number: &'static str,
    batch: &'static str,
    branch: &'static str,
    email: &'static str,
    contact_number: &'static str,
    parent_contact_number: &'static str,
    parent_email: &'static str,
}

const SAMPLE_STUDENTS: [SampleStudent; 3] = [
    SampleStudent {
        full_name: "Aarav Sharma",
        roll_number: "23CE0001",
        batch: "Batch 1",
        branch: "CE",
        email: "aarav.sharma@example.com",
        contact_number: "9999990001",
        parent_contact_number: "8888880001",
        parent_email: "parent.aarav@example.com",
    },
    SampleStudent {
        full_name: "Riya Verma",
        roll_number: "23IT0002",
        batch: "Batch 2",
        branch: "IT",
        email: "riya.verma@example.com",
        contact_number: "9999990002",
        parent_contact_number: "8888880002",
        parent_email: "parent.riya@example.com",
    },
    SampleStudent {
        full_name: "Kunal Mehta",
        roll_number: "23AD0003",
        batch: "Batch 4",
        branch: "AD",
        email: "kunal.mehta@example.com",
        contact_number: "9999990003",
        parent_contact_number: "8888880003",
        parent_email: "parent.kunal@example.com",
    },
];

/// What [`AttendanceManager::seed_core`] added. Rows that already existed are not counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub batches: usize,
    pub students: usize,
}

impl AttendanceManager {
    /// Creates the standard batches, branches and sample students. Safe to run repeatedly.
    pub fn seed_core(&mut self) -> Result<SeedSummary> {
        self.transaction(|manager| {
            let mut summary = SeedSummary::default();

            for name in BATCH_NAMES {
                let (_, created) = manager.get_or_create_batch(name)?;
                if created {
                    summary.batches += 1;
                }
            }

            for sample in &SAMPLE_STUDENTS {
                if manager.find_by_roll_number(sample.roll_number)?.is_some() {
                    continue;
                }

                let (batch, _) = manager.get_or_create_batch(sample.batch)?;
                let branch = manager.get_or_create_branch(sample.branch)?;

                manager.insert_student(&NewStudent {
                    full_name: sample.full_name.to_string(),
                    roll_number: sample.roll_number.to_string(),
                    batch_id: batch.id,
                    branch_id: branch.id,
                    email: sample.email.to_string(),
                    contact_number: sample.contact_number.to_string(),
                    parent_contact_number: sample.parent_contact_number.to_string(),
                    parent_email: sample.parent_email.to_string(),
                    is_active: true,
                })?;
                summary.students += 1;
            }

            info!(?summary, "seeded core data");

            Ok(summary)
        })
    }
}
