//! Built-in reference data, used when no catalog exists on disk or the
//! stored one cannot be parsed.

use crate::models::{SyndromeRecord, TimelineStep, TreatmentGuideline};
use std::collections::BTreeMap;

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn syndrome(
    id: &str,
    name: &str,
    description: &str,
    symptoms: &[&str],
    genes: &[&str],
    prevalence: &str,
    references: &[&str],
) -> SyndromeRecord {
    SyndromeRecord {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        symptoms: symptoms.iter().map(|s| s.to_string()).collect(),
        genes: strings(genes),
        inheritance: "autosomal dominant".to_string(),
        prevalence: prevalence.to_string(),
        references: strings(references),
    }
}

fn guideline(
    id: &str,
    title: &str,
    timeline: &[(&str, &str)],
    follow_up: &[&str],
    references: &[&str],
) -> TreatmentGuideline {
    TreatmentGuideline {
        condition_id: id.to_string(),
        title: title.to_string(),
        timeline: timeline
            .iter()
            .map(|(age, action)| TimelineStep {
                age_window: age.to_string(),
                action: action.to_string(),
            })
            .collect(),
        follow_up: strings(follow_up),
        references: strings(references),
    }
}

pub fn default_syndromes() -> BTreeMap<String, SyndromeRecord> {
    [
        syndrome(
            "van_der_woude_syndrome",
            "Van der Woude syndrome",
            "Autosomal dominant disorder characterised by cleft lip and/or palate with lower lip pits",
            &["cleft_lip", "cleft_palate", "lower_lip_pits", "missing_teeth"],
            &["IRF6"],
            "1/35,000-1/100,000",
            &["PMID:15316113", "PMID:24124023"],
        ),
        syndrome(
            "treacher_collins_syndrome",
            "Treacher Collins syndrome",
            "Autosomal dominant disorder of craniofacial development",
            &[
                "mandibular_hypoplasia",
                "zygomatic_hypoplasia",
                "auricular_malformation",
                "ptosis",
                "cleft_palate",
            ],
            &["TCOF1", "POLR1C", "POLR1D"],
            "1/50,000",
            &["PMID:18627481", "PMID:28944301"],
        ),
        syndrome(
            "stickler_syndrome",
            "Stickler syndrome",
            "Connective tissue disorder with facial, ocular and joint involvement",
            &[
                "cleft_palate",
                "micrognathia",
                "myopia",
                "retinal_detachment",
                "joint_pain",
            ],
            &["COL2A1", "COL11A1", "COL11A2"],
            "1/7,500-1/9,000",
            &["PMID:15316113", "PMID:17492793"],
        ),
    ]
    .into_iter()
    .map(|record| (record.id.clone(), record))
    .collect()
}

pub fn default_guidelines() -> BTreeMap<String, TreatmentGuideline> {
    [
        guideline(
            "non_syndromic_cleft_lip",
            "Non-syndromic cleft lip treatment guideline",
            &[
                ("0-3 months", "Presurgical orthodontics, feeding guidance"),
                ("3-6 months", "Cleft lip repair"),
                ("6-12 months", "Speech development monitoring"),
                ("12-18 months", "Cleft palate repair if required"),
            ],
            &[
                "Speech therapy",
                "Dental and maxillofacial growth monitoring",
                "Psychological support",
            ],
            &["PMID:25187187", "PMID:28944301"],
        ),
        guideline(
            "non_syndromic_cleft_palate",
            "Non-syndromic cleft palate treatment guideline",
            &[
                ("0-3 months", "Feeding guidance, specialised teats"),
                ("9-18 months", "Cleft palate repair"),
                ("2-4 years", "Speech assessment and intervention"),
            ],
            &[
                "Hearing checks",
                "Speech therapy",
                "Dental and maxillofacial growth monitoring",
            ],
            &["PMID:25187187", "PMID:26361258"],
        ),
        guideline(
            "van_der_woude_syndrome",
            "Van der Woude syndrome treatment guideline",
            &[
                ("0-3 months", "Feeding guidance, genetic counselling"),
                ("3-6 months", "Cleft lip repair"),
                ("9-18 months", "Cleft palate repair"),
                ("5-7 years", "Lower lip pit excision if required"),
            ],
            &[
                "Speech therapy",
                "Dental and maxillofacial growth monitoring",
                "Genetic counselling",
            ],
            &["PMID:15316113", "PMID:24124023"],
        ),
    ]
    .into_iter()
    .map(|guideline| (guideline.condition_id.clone(), guideline))
    .collect()
}
