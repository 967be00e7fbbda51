//! The fixed engineer profile (spec.md §3 "Engineer Profile"). External,
//! read-only, loaded once per process into an `Arc` shared by reference
//! across every pipeline run.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::embedded::ProfileAssets;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineerProfile {
    pub name: String,
    pub bio: String,
    pub skills: HashMap<String, Vec<String>>,
    pub projects: Vec<Project>,
    pub experience: Vec<Experience>,
    pub education: String,
    pub strengths: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    pub description: String,
    pub tech: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experience {
    pub company: String,
    pub title: String,
    pub years: String,
    pub highlights: Vec<String>,
}

impl EngineerProfile {
    /// Flattened, lowercased, deduplicated view of every skill the profile
    /// claims across all categories and project tech stacks -- the set P4
    /// matches requirements against.
    pub fn all_skills_lowercased(&self) -> Vec<String> {
        let mut set = std::collections::HashSet::new();
        for skills in self.skills.values() {
            for skill in skills {
                set.insert(skill.to_lowercase());
            }
        }
        for project in &self.projects {
            for tech in &project.tech {
                set.insert(tech.to_lowercase());
            }
        }
        let mut out: Vec<String> = set.into_iter().collect();
        out.sort();
        out
    }

    pub fn load() -> Result<Self, anyhow::Error> {
        let file = ProfileAssets::get("profile.json")
            .ok_or_else(|| anyhow::anyhow!("embedded profile.json not found"))?;
        let profile: EngineerProfile = serde_json::from_slice(&file.data)?;
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_profile_loads_and_parses() {
        let profile = EngineerProfile::load().expect("embedded profile.json is valid");
        assert!(!profile.name.is_empty());
        assert!(!profile.skills.is_empty());
    }

    #[test]
    fn all_skills_lowercased_is_deduplicated() {
        let profile = EngineerProfile::load().expect("embedded profile.json is valid");
        let skills = profile.all_skills_lowercased();
        let mut sorted = skills.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(skills.len(), sorted.len());
    }
}
