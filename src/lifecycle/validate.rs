use std::collections::HashSet;

use super::{CreateProjectInput, ProjectError, ProjectManager, UpdateProjectInput};
use crate::storage::models::{
    Patch, ProjectAggregate, ProjectChanges, ProjectRole, StaffAssignment,
};

fn invalid(msg: impl Into<String>) -> ProjectError {
    ProjectError::Validation(msg.into())
}

fn required_text(field: &str, value: &str) -> Result<String, ProjectError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(invalid(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

/// Trim, drop duplicates, and reject blank member identifiers.
fn normalize_members(members: &[String]) -> Result<Vec<String>, ProjectError> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(members.len());
    for member in members {
        let member = member.trim();
        if member.is_empty() {
            return Err(invalid("member identifiers must not be blank"));
        }
        if seen.insert(member.to_string()) {
            out.push(member.to_string());
        }
    }
    Ok(out)
}

fn dedup_ids(ids: &[u64]) -> Vec<u64> {
    let mut seen = HashSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

/// Reject a staff member listed twice or more than one advisor.
fn check_staff_roles(staff: &[StaffAssignment]) -> Result<(), ProjectError> {
    let mut seen = HashSet::new();
    for assignment in staff {
        if !seen.insert(assignment.staff_id) {
            return Err(invalid(format!(
                "staff {} is assigned more than once",
                assignment.staff_id
            )));
        }
    }
    let advisors = staff
        .iter()
        .filter(|s| s.role == ProjectRole::Advisor)
        .count();
    if advisors > 1 {
        return Err(invalid("a project has at most one advisor"));
    }
    Ok(())
}

impl ProjectManager {
    fn check_staff_exist(&self, staff: &[StaffAssignment]) -> Result<(), ProjectError> {
        for assignment in staff {
            if self.catalog.staff(assignment.staff_id)?.is_none() {
                return Err(invalid(format!("staff {} does not exist", assignment.staff_id)));
            }
        }
        Ok(())
    }

    fn check_keywords(&self, program_id: u64, keyword_ids: &[u64]) -> Result<(), ProjectError> {
        for id in keyword_ids {
            match self.catalog.keyword(*id)? {
                None => return Err(invalid(format!("keyword {id} does not exist"))),
                Some(k) if k.program_id != program_id => {
                    return Err(invalid(format!(
                        "keyword {id} does not belong to program {program_id}"
                    )))
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Validate everything about a create except its files.
    /// Returns the normalized scalar fields ready for insertion.
    pub(super) fn validate_create(
        &self,
        input: &CreateProjectInput,
    ) -> Result<ValidatedCreate, ProjectError> {
        let title_th = required_text("title_th", &input.title_th)?;
        let title_en = required_text("title_en", &input.title_en)?;
        let abstract_text = input
            .abstract_text
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        if !(1..=9999).contains(&input.academic_year) {
            return Err(invalid("academic_year must be between 1 and 9999"));
        }
        if !(1..=9).contains(&input.semester) {
            return Err(invalid("semester must be between 1 and 9"));
        }

        if self.catalog.program(input.program_id)?.is_none() {
            return Err(invalid(format!("program {} does not exist", input.program_id)));
        }
        let course = self
            .catalog
            .course(input.course_id)?
            .ok_or_else(|| invalid(format!("course {} does not exist", input.course_id)))?;
        if course.program_id != input.program_id {
            return Err(invalid(format!(
                "course {} does not belong to program {}",
                input.course_id, input.program_id
            )));
        }

        check_staff_roles(&input.staff)?;
        self.check_staff_exist(&input.staff)?;

        let keyword_ids = dedup_ids(&input.keyword_ids);
        self.check_keywords(input.program_id, &keyword_ids)?;

        Ok(ValidatedCreate {
            title_th,
            title_en,
            abstract_text,
            members: normalize_members(&input.members)?,
            keyword_ids,
        })
    }

    /// Validate an update against the current aggregate and build the
    /// store-level changes. Resource additions are filled in after upload.
    pub(super) fn validate_update(
        &self,
        current: &ProjectAggregate,
        input: &UpdateProjectInput,
    ) -> Result<ProjectChanges, ProjectError> {
        let nothing_requested = input.title_th.is_none()
            && input.title_en.is_none()
            && input.abstract_text.is_absent()
            && input.is_public.is_none()
            && input.add_staff.is_empty()
            && input.remove_staff.is_empty()
            && input.add_members.is_empty()
            && input.remove_members.is_empty()
            && input.add_keywords.is_empty()
            && input.remove_keywords.is_empty()
            && input.add_resources.is_empty()
            && input.remove_resources.is_empty();
        if nothing_requested {
            return Err(invalid("at least one change must be provided"));
        }

        let title_th = input
            .title_th
            .as_deref()
            .map(|t| required_text("title_th", t))
            .transpose()?;
        let title_en = input
            .title_en
            .as_deref()
            .map(|t| required_text("title_en", t))
            .transpose()?;

        // Staff: the resulting set must still hold the role rules.
        check_staff_roles(&input.add_staff)?;
        self.check_staff_exist(&input.add_staff)?;
        let mut resulting: Vec<StaffAssignment> = current
            .staff
            .iter()
            .filter(|s| {
                !input.remove_staff.contains(&s.staff_id)
                    && !input.add_staff.iter().any(|a| a.staff_id == s.staff_id)
            })
            .cloned()
            .collect();
        resulting.extend(input.add_staff.iter().cloned());
        check_staff_roles(&resulting)?;

        let add_keywords = dedup_ids(&input.add_keywords);
        self.check_keywords(current.project.program_id, &add_keywords)?;

        for id in &input.remove_resources {
            if !current.resources.iter().any(|r| r.id == *id) {
                return Err(invalid(format!(
                    "resource {id} does not belong to project {}",
                    current.project.id
                )));
            }
        }

        let abstract_text = match &input.abstract_text {
            Patch::Value(text) if text.trim().is_empty() => Patch::Null,
            Patch::Value(text) => Patch::Value(text.trim().to_string()),
            other => other.clone(),
        };

        Ok(ProjectChanges {
            title_th,
            title_en,
            abstract_text,
            is_public: input.is_public,
            add_staff: input.add_staff.clone(),
            remove_staff: dedup_ids(&input.remove_staff),
            add_members: normalize_members(&input.add_members)?,
            remove_members: input
                .remove_members
                .iter()
                .map(|m| m.trim().to_string())
                .collect(),
            add_keywords,
            remove_keywords: dedup_ids(&input.remove_keywords),
            add_resources: Vec::new(),
            remove_resources: dedup_ids(&input.remove_resources),
        })
    }
}

/// Normalized scalar fields of a create request.
pub(super) struct ValidatedCreate {
    pub title_th: String,
    pub title_en: String,
    pub abstract_text: Option<String>,
    pub members: Vec<String>,
    pub keyword_ids: Vec<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assign(staff_id: u64, role: ProjectRole) -> StaffAssignment {
        StaffAssignment { staff_id, role }
    }

    #[test]
    fn test_members_are_trimmed_and_deduplicated() {
        let members = vec![" 6401 ".to_string(), "6402".to_string(), "6401".to_string()];
        assert_eq!(normalize_members(&members).unwrap(), vec!["6401", "6402"]);
        assert!(normalize_members(&["  ".to_string()]).is_err());
    }

    #[test]
    fn test_staff_role_rules() {
        assert!(check_staff_roles(&[
            assign(1, ProjectRole::Advisor),
            assign(2, ProjectRole::CoAdvisor),
            assign(3, ProjectRole::Committee),
        ])
        .is_ok());
        assert!(check_staff_roles(&[
            assign(1, ProjectRole::Advisor),
            assign(2, ProjectRole::Advisor),
        ])
        .is_err());
        assert!(check_staff_roles(&[
            assign(1, ProjectRole::CoAdvisor),
            assign(1, ProjectRole::Committee),
        ])
        .is_err());
    }
}
