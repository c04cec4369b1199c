use crate::core::{DocError, path};
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use serde_json::Value;
use tracing::{Level, event};

use super::Document;

impl Document {
    /// Runs every compiler hook, in declaration order.
    pub(crate) fn compile_paths(&mut self) {
        let schema = self.model.schema().clone();
        for compiled in schema.compilers() {
            if let Some(compiler) = schema.path(compiled).and_then(|d| d.compiler.clone()) {
                compiler(self, compiled);
            }
        }
    }

    /// Runs the validators of every dirty path concurrently and waits for all
    /// of them. Failures are appended to the document errors; the number of
    /// failures is returned.
    pub async fn validate(&mut self) -> usize {
        let schema = self.model.schema().clone();
        let mut pending = FuturesUnordered::new();

        for dirty_path in self.dirty.keys() {
            let Some(descriptor) = schema.path(dirty_path) else {
                continue;
            };
            let value = path::get(&self.doc, dirty_path)
                .cloned()
                .unwrap_or(Value::Null);
            for (name, validator) in &descriptor.validators {
                let verdict = validator(value.clone());
                let dirty_path = dirty_path.clone();
                let name = name.clone();
                pending.push(async move { (dirty_path, name, verdict.await) });
            }
        }

        let mut remaining = pending.len();
        if remaining == 0 {
            return 0;
        }
        event!(Level::DEBUG, validators = remaining, "validation gate armed");

        let mut failures = 0;
        while remaining > 0 {
            let Some((failed_path, name, verdict)) = pending.next().await else {
                break;
            };
            remaining -= 1;
            if !verdict.passed {
                failures += 1;
                self.errors
                    .push(DocError::validation(&failed_path, &name, verdict.message));
            }
        }

        event!(Level::DEBUG, failures, "validation gate released");
        failures
    }
}
