//! Target-feature negotiation.
//!
//! Builds the used/required/disallowed sets from the input files and
//! validates them against the configuration. Each map records the first
//! file that introduced a feature so errors can cite it.

use indexmap::IndexMap;

use eoslink_object::FeaturePolicy;

use crate::writer::Writer;

impl Writer<'_> {
    pub(crate) fn populate_target_features(&mut self) {
        let mut used: IndexMap<String, String> = IndexMap::new();
        let mut required: IndexMap<String, String> = IndexMap::new();
        let mut disallowed: IndexMap<String, String> = IndexMap::new();
        let mut tls_used = false;

        // Only infer used features if the user did not specify a set.
        let infer_features = self.config.features.is_none();

        if let Some(features) = &self.config.features {
            self.out_features.extend(features.iter().cloned());
            // No need to read or check features.
            if !self.config.check_features {
                return;
            }
        }

        for file in self.objects.iter() {
            for feature in &file.features {
                match feature.policy {
                    FeaturePolicy::Used => {
                        used.entry(feature.name.clone())
                            .or_insert_with(|| file.name.clone());
                    }
                    FeaturePolicy::Required => {
                        used.entry(feature.name.clone())
                            .or_insert_with(|| file.name.clone());
                        required
                            .entry(feature.name.clone())
                            .or_insert_with(|| file.name.clone());
                    }
                    FeaturePolicy::Disallowed => {
                        disallowed
                            .entry(feature.name.clone())
                            .or_insert_with(|| file.name.clone());
                    }
                }
            }

            for segment in &file.segments {
                if !segment.live {
                    continue;
                }
                if segment.name.starts_with(".tdata") || segment.name.starts_with(".tbss") {
                    tls_used = true;
                }
            }
        }

        if infer_features {
            self.out_features.extend(used.keys().cloned());
        }

        if self.out_features.contains("atomics") && !self.config.shared_memory {
            if infer_features {
                self.diagnostics.error(format!(
                    "'atomics' feature is used by {}, so --shared-memory must be used",
                    used["atomics"]
                ));
            } else {
                self.diagnostics
                    .error("'atomics' feature is used, so --shared-memory must be used");
            }
        }

        if !self.config.check_features {
            return;
        }

        if disallowed.contains_key("atomics") && self.config.shared_memory {
            self.diagnostics.error(format!(
                "'atomics' feature is disallowed by {}, so --shared-memory must not be used",
                disallowed["atomics"]
            ));
        }

        if !used.contains_key("bulk-memory") && self.config.passive_segments {
            self.diagnostics
                .error("'bulk-memory' feature must be used in order to emit passive segments");
        }

        if !used.contains_key("bulk-memory") && tls_used {
            self.diagnostics
                .error("'bulk-memory' feature must be used in order to use thread-local storage");
        }

        // Validate that used features are allowed in the output.
        if !infer_features {
            for (feature, file) in &used {
                if !self.out_features.contains(feature) {
                    self.diagnostics.error(format!(
                        "Target feature '{feature}' used by {file} is not allowed."
                    ));
                }
            }
        }

        // Validate the required and disallowed constraints for each file.
        for file in self.objects.iter() {
            let mut object_features: Vec<&str> = Vec::new();
            for feature in &file.features {
                if feature.policy == FeaturePolicy::Disallowed {
                    continue;
                }
                object_features.push(&feature.name);
                if let Some(by) = disallowed.get(&feature.name) {
                    self.diagnostics.error(format!(
                        "Target feature '{}' used in {} is disallowed by {}. \
                         Use --no-check-features to suppress.",
                        feature.name, file.name, by
                    ));
                }
            }
            for (feature, by) in &required {
                if !object_features.contains(&feature.as_str()) {
                    self.diagnostics.error(format!(
                        "Missing target feature '{}' in {}, required by {}. \
                         Use --no-check-features to suppress.",
                        feature, file.name, by
                    ));
                }
            }
        }
    }
}
