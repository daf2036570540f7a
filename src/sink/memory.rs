// src/sink/memory.rs
//! In-process point store for offline runs and tests.

use async_trait::async_trait;
use std::sync::Mutex;

use super::{Point, PointWriter};
use crate::error::SinkError;

#[derive(Debug, Default)]
pub struct MemoryWriter {
    points: Mutex<Vec<Point>>,
    fail: bool,
}

impl MemoryWriter {
    /// Rejects every write with a 503.
    pub fn failing() -> Self {
        Self {
            points: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn points(&self) -> Vec<Point> {
        self.points.lock().expect("memory sink mutex poisoned").clone()
    }
}

#[async_trait]
impl PointWriter for MemoryWriter {
    async fn write_point(&self, point: &Point) -> Result<(), SinkError> {
        if self.fail {
            return Err(SinkError::Status {
                status: 503,
                body: "memory sink configured to fail".to_string(),
            });
        }
        self.points
            .lock()
            .expect("memory sink mutex poisoned")
            .push(point.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
