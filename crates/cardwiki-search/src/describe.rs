//! Plain-language rendering of a plan, one line per step.

use cardwiki_store::{Limit, SortDirection};

use crate::inflect::{plural, singular};
use crate::plan::{Operand, PlanStep, StepId, StepKind};

pub fn describe(steps: &[PlanStep]) -> Vec<String> {
    steps.iter().map(|step| line(steps, step)).collect()
}

fn many(name: &str) -> String {
    plural(&singular(name))
}

fn subject_of(steps: &[PlanStep], id: StepId) -> String {
    steps
        .get(id.0)
        .map(PlanStep::subject)
        .unwrap_or_else(|| id.to_string())
}

fn operand(steps: &[PlanStep], operand: &Operand) -> String {
    match operand {
        Operand::Column { step, .. } => subject_of(steps, *step),
        Operand::Const(v) => v.to_string(),
    }
}

fn line(steps: &[PlanStep], step: &PlanStep) -> String {
    match &step.kind {
        StepKind::Find { entity } => format!("find {entity}"),
        StepKind::Gather { collection } => {
            let what = collection.as_deref().map(many).unwrap_or_else(|| "anything".into());
            match step.related_to {
                Some(_) if step.deselect => format!("without {what} related to those"),
                Some(_) => format!("gather {what} related to those"),
                None => format!("gather {what}"),
            }
        }
        StepKind::Lookup { attribute } if step.deselect => format!("without any {attribute}"),
        StepKind::Lookup { attribute } => format!("lookup {attribute}"),
        StepKind::Intersect { collection } if step.deselect => format!("remove the {}", many(collection)),
        StepKind::Intersect { collection } => format!("keep only the {}", many(collection)),
        StepKind::FilterByEntity { entity, member } => match (*member, step.deselect) {
            (true, true) => format!("remove {entity}"),
            (true, false) => format!("keep only {entity}"),
            (false, true) => format!("remove anything related to {entity}"),
            (false, false) => format!("related to {entity}"),
        },
        StepKind::Filter { func, args } => {
            let args: Vec<String> = args.iter().map(|(_, a)| operand(steps, a)).collect();
            format!("filter those by {}", args.join(&format!(" {} ", func.symbol())))
        }
        StepKind::Calculate { func, args } => {
            let args: Vec<String> = args.iter().map(|(_, a)| operand(steps, a)).collect();
            format!("calculate {}", args.join(&format!(" {} ", func.symbol())))
        }
        StepKind::Aggregate { func, args } => match args.first() {
            Some((_, a)) => format!("{} of {}", func.as_str(), operand(steps, a)),
            None => func.as_str().to_string(),
        },
        StepKind::Group { fields } => {
            let names: Vec<String> = fields.iter().map(|(s, _)| subject_of(steps, *s)).collect();
            format!("group them by {}", names.join(", "))
        }
        StepKind::Sort { fields } => {
            let names: Vec<String> = fields
                .iter()
                .map(|(s, _, direction)| {
                    let order = match direction {
                        SortDirection::Ascending => "ascending",
                        SortDirection::Descending => "descending",
                    };
                    format!("{} {order}", subject_of(steps, *s))
                })
                .collect();
            format!("sort them by {}", names.join(", "))
        }
        StepKind::Limit { limit } => match limit {
            Limit::Results(n) => format!("limit to {n} results"),
            Limit::PerGroup(n) => format!("limit to {n} items per group"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(id: usize, related_to: Option<usize>, deselect: bool, kind: StepKind) -> PlanStep {
        PlanStep {
            id: StepId(id),
            related_to: related_to.map(StepId),
            deselect,
            kind,
        }
    }

    #[test]
    fn describes_each_step() {
        let steps = vec![
            step(0, None, false, StepKind::Gather { collection: Some("movies".into()) }),
            step(1, Some(0), false, StepKind::Intersect { collection: "studio".into() }),
            step(
                2,
                Some(0),
                true,
                StepKind::FilterByEntity {
                    entity: "pixar".into(),
                    member: false,
                },
            ),
            step(
                3,
                Some(0),
                true,
                StepKind::FilterByEntity {
                    entity: "up".into(),
                    member: true,
                },
            ),
            step(4, Some(0), true, StepKind::Gather { collection: Some("studio".into()) }),
            step(5, None, false, StepKind::Limit { limit: Limit::Results(5) }),
        ];
        assert_eq!(
            describe(&steps),
            vec![
                "gather movies",
                "keep only the studios",
                "remove anything related to pixar",
                "remove up",
                "without studios related to those",
                "limit to 5 results",
            ]
        );
    }
}
