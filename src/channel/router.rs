// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::channel::{BoundInputs, SlotBinding, SlotSource, UpstreamReport};
use crate::errors::RouteError;
use crate::process::{Arity, InputDecl};
use std::collections::BTreeMap;

/// Bind upstream emissions to a task's declared input slots.
///
/// `upstreams` is in dependency declaration order; that order, then the
/// artifact order inside each emission, is the order artifacts reach a
/// slot. Tags match exactly. A `single` slot fed by more than one producer
/// is ambiguous; a slot whose only producers were skipped is marked so the
/// instantiator can decide whether that is acceptable.
pub fn route(
    upstreams: &[UpstreamReport],
    decls: &[InputDecl],
    sources: &BTreeMap<String, SlotSource>,
) -> Result<BoundInputs, RouteError> {
    if let Some(slot) = sources
        .keys()
        .find(|slot| !decls.iter().any(|d| &d.name == *slot))
    {
        return Err(RouteError::UnknownSlot { slot: slot.clone() });
    }

    let mut bound = BoundInputs::new();
    for decl in decls {
        let binding = match sources.get(&decl.name) {
            None if decl.optional => SlotBinding::Bound(Vec::new()),
            None => {
                return Err(RouteError::UnboundInput {
                    slot: decl.name.clone(),
                })
            }
            Some(SlotSource::Literal(artifacts)) => SlotBinding::Bound(artifacts.clone()),
            Some(SlotSource::Channel { tag }) => bind_channel(upstreams, decl, tag)?,
        };
        bound.insert(decl.name.clone(), binding);
    }
    Ok(bound)
}

fn bind_channel(
    upstreams: &[UpstreamReport],
    decl: &InputDecl,
    tag: &str,
) -> Result<SlotBinding, RouteError> {
    let mut producers = Vec::new();
    let mut artifacts = Vec::new();
    let mut skipped_by = None;

    for upstream in upstreams {
        match upstream {
            UpstreamReport::Completed { emissions, .. } => {
                for emission in emissions.iter().filter(|e| e.tag == tag) {
                    if !producers.contains(&emission.producer) {
                        producers.push(emission.producer.clone());
                    }
                    artifacts.extend(emission.artifacts.iter().cloned());
                }
            }
            UpstreamReport::Skipped { task_id, tags } => {
                if skipped_by.is_none() && tags.iter().any(|t| t == tag) {
                    skipped_by = Some(task_id.clone());
                }
            }
            UpstreamReport::Failed { .. } => {}
        }
    }

    if producers.len() > 1 && decl.arity == Arity::Single {
        return Err(RouteError::AmbiguousBinding {
            slot: decl.name.clone(),
            tag: tag.to_string(),
            producers,
        });
    }

    match skipped_by {
        Some(upstream) if producers.is_empty() => Ok(SlotBinding::UpstreamSkipped { upstream }),
        _ => Ok(SlotBinding::Bound(artifacts)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Emission;
    use crate::process::Artifact;

    fn completed(task_id: &str, tag: &str, files: &[&str]) -> UpstreamReport {
        UpstreamReport::Completed {
            task_id: task_id.into(),
            emissions: vec![
                Emission {
                    producer: task_id.into(),
                    tag: tag.into(),
                    artifacts: files
                        .iter()
                        .map(|f| Artifact::file(*f).with_producer(task_id))
                        .collect(),
                },
                Emission {
                    producer: task_id.into(),
                    tag: "versions".into(),
                    artifacts: vec![Artifact::file(format!("/work/{}/versions.yml", task_id))],
                },
            ],
        }
    }

    fn channel(tag: &str) -> SlotSource {
        SlotSource::Channel { tag: tag.into() }
    }

    #[test]
    fn test_single_producer_binds_in_order() {
        let upstreams = vec![completed("align", "fas", &["/w/a_mafft.fa"])];
        let decls = vec![InputDecl::file("alignment")];
        let sources = BTreeMap::from([("alignment".to_string(), channel("fas"))]);

        let bound = route(&upstreams, &decls, &sources).unwrap();
        let Some(SlotBinding::Bound(artifacts)) = bound.get("alignment") else {
            panic!("expected bound artifacts");
        };
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].produced_by.as_deref(), Some("align"));
    }

    #[test]
    fn test_multiple_producers_merge_for_multiple_arity() {
        let upstreams = vec![
            completed("align@b", "fas", &["/w/b_mafft.fa"]),
            completed("align@a", "fas", &["/w/a_mafft.fa", "/w/a2_mafft.fa"]),
        ];
        let decls = vec![InputDecl::file("alignments").multiple()];
        let sources = BTreeMap::from([("alignments".to_string(), channel("fas"))]);

        let bound = route(&upstreams, &decls, &sources).unwrap();
        let Some(SlotBinding::Bound(artifacts)) = bound.get("alignments") else {
            panic!("expected bound artifacts");
        };
        let paths: Vec<_> = artifacts.iter().filter_map(|a| a.path()).collect();
        assert_eq!(
            paths,
            vec![
                std::path::Path::new("/w/b_mafft.fa"),
                std::path::Path::new("/w/a_mafft.fa"),
                std::path::Path::new("/w/a2_mafft.fa")
            ]
        );
    }

    #[test]
    fn test_multiple_producers_into_single_slot_is_ambiguous() {
        let upstreams = vec![
            completed("align_a", "fas", &["/w/a.fa"]),
            completed("align_b", "fas", &["/w/b.fa"]),
        ];
        let decls = vec![InputDecl::file("alignment")];
        let sources = BTreeMap::from([("alignment".to_string(), channel("fas"))]);

        assert_eq!(
            route(&upstreams, &decls, &sources).unwrap_err(),
            RouteError::AmbiguousBinding {
                slot: "alignment".into(),
                tag: "fas".into(),
                producers: vec!["align_a".into(), "align_b".into()],
            }
        );
    }

    #[test]
    fn test_tags_match_exactly() {
        let upstreams = vec![completed("align", "fas", &["/w/a.fa"])];
        let decls = vec![InputDecl::file("alignment")];
        let sources = BTreeMap::from([("alignment".to_string(), channel("FAS"))]);

        let bound = route(&upstreams, &decls, &sources).unwrap();
        assert_eq!(bound.get("alignment"), Some(&SlotBinding::Bound(vec![])));
    }

    #[test]
    fn test_skipped_upstream_marks_slot() {
        let upstreams = vec![UpstreamReport::Skipped {
            task_id: "align".into(),
            tags: vec!["fas".into(), "versions".into()],
        }];
        let decls = vec![InputDecl::file("alignment")];
        let sources = BTreeMap::from([("alignment".to_string(), channel("fas"))]);

        let bound = route(&upstreams, &decls, &sources).unwrap();
        assert_eq!(
            bound.get("alignment"),
            Some(&SlotBinding::UpstreamSkipped {
                upstream: "align".into()
            })
        );
    }

    #[test]
    fn test_literal_and_missing_sources() {
        let decls = vec![
            InputDecl::file("fasta"),
            InputDecl::value("mode").optional(),
        ];
        let sources = BTreeMap::from([(
            "fasta".to_string(),
            SlotSource::Literal(vec![Artifact::file("/data/a.fa")]),
        )]);
        let bound = route(&[], &decls, &sources).unwrap();
        assert_eq!(bound.get("mode"), Some(&SlotBinding::Bound(vec![])));

        let err = route(&[], &[InputDecl::file("fasta")], &BTreeMap::new()).unwrap_err();
        assert_eq!(err, RouteError::UnboundInput { slot: "fasta".into() });

        let sources = BTreeMap::from([("nope".to_string(), channel("fas"))]);
        let err = route(&[], &decls, &sources).unwrap_err();
        assert_eq!(err, RouteError::UnknownSlot { slot: "nope".into() });
    }
}
