//! In-memory `SubjectStore` + `SubjectAdmin` with commit fault injection.
//!
//! `commit_observation` stages the log write and the timestamp write on a
//! private copy and only swaps it in after both succeed. An injected fault at
//! any point between the writes discards the staged copy, which is the same
//! all-or-nothing contract the Postgres store gets from a transaction. The
//! previous log is read under the same lock, so concurrent commits for one
//! subject each see the log the other wrote.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kdw_reconcile::{Committed, StoreError, SubjectAdmin, SubjectStore};
use kdw_schemas::{
    GameIdentity, NewSubject, NewUser, Observation, PerformanceLog, Subject, SubjectId, User,
    UserId,
};

/// Where inside `commit_observation` a simulated crash happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitFault {
    BeforeLogWrite,
    AfterLogWrite,
    AfterTimestampWrite,
}

#[derive(Default)]
struct Inner {
    next_user_id: UserId,
    next_subject_id: SubjectId,
    users: BTreeMap<UserId, User>,
    subjects: BTreeMap<SubjectId, Subject>,
    logs: HashMap<SubjectId, PerformanceLog>,
    faults: HashMap<SubjectId, CommitFault>,
    fail_list_active: Option<StoreError>,
    commits: usize,
}

impl Inner {
    /// Subject with the owner's phone joined in, as the SQL store returns it.
    fn joined(&self, subject: &Subject) -> Subject {
        let mut s = subject.clone();
        s.notify_to = s
            .owner_id
            .and_then(|id| self.users.get(&id))
            .and_then(|u| u.phone_number.clone());
        s
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panicking test thread must not hide the store from the assertions after it.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ---------------------------------------------------------------------
    // Seeding
    // ---------------------------------------------------------------------

    pub fn seed_user(&self, auth_id: &str, phone_number: Option<&str>) -> User {
        let mut g = self.lock();
        g.next_user_id += 1;
        let user = User {
            id: g.next_user_id,
            auth_id: auth_id.to_string(),
            email: None,
            phone_number: phone_number.map(str::to_string),
            signup_date: Utc::now(),
        };
        g.users.insert(user.id, user.clone());
        user
    }

    pub fn seed_subject(
        &self,
        owner_id: Option<UserId>,
        puuid: &str,
        identity: GameIdentity,
        active: bool,
    ) -> Subject {
        let mut g = self.lock();
        g.next_subject_id += 1;
        let subject = Subject {
            id: g.next_subject_id,
            owner_id,
            puuid: puuid.to_string(),
            identity,
            active,
            last_checked: None,
            notify_to: None,
        };
        g.subjects.insert(subject.id, subject.clone());
        g.joined(&subject)
    }

    pub fn seed_log(&self, log: PerformanceLog) {
        self.lock().logs.insert(log.subject_id, log);
    }

    // ---------------------------------------------------------------------
    // Fault injection
    // ---------------------------------------------------------------------

    /// Every commit for `subject_id` fails at `fault` until cleared.
    pub fn inject_commit_fault(&self, subject_id: SubjectId, fault: CommitFault) {
        self.lock().faults.insert(subject_id, fault);
    }

    pub fn clear_commit_faults(&self) {
        self.lock().faults.clear();
    }

    pub fn fail_list_active(&self, err: Option<StoreError>) {
        self.lock().fail_list_active = err;
    }

    // ---------------------------------------------------------------------
    // Snapshots for assertions
    // ---------------------------------------------------------------------

    pub fn subject(&self, id: SubjectId) -> Option<Subject> {
        let g = self.lock();
        g.subjects.get(&id).map(|s| g.joined(s))
    }

    pub fn log(&self, id: SubjectId) -> Option<PerformanceLog> {
        self.lock().logs.get(&id).cloned()
    }

    pub fn last_checked(&self, id: SubjectId) -> Option<DateTime<Utc>> {
        self.lock().subjects.get(&id).and_then(|s| s.last_checked)
    }

    /// Successful commits only.
    pub fn commit_count(&self) -> usize {
        self.lock().commits
    }
}

fn injected(fault: CommitFault, id: SubjectId) -> StoreError {
    StoreError::Unavailable(format!("injected {fault:?} for subject {id}"))
}

#[async_trait]
impl SubjectStore for InMemoryStore {
    async fn list_active(&self) -> Result<Vec<Subject>, StoreError> {
        let g = self.lock();
        if let Some(err) = &g.fail_list_active {
            return Err(err.clone());
        }
        Ok(g
            .subjects
            .values()
            .filter(|s| s.active)
            .map(|s| g.joined(s))
            .collect())
    }

    async fn get_subject(&self, id: SubjectId) -> Result<Option<Subject>, StoreError> {
        Ok(self.subject(id))
    }

    async fn get_log(&self, id: SubjectId) -> Result<Option<PerformanceLog>, StoreError> {
        Ok(self.log(id))
    }

    async fn commit_observation(
        &self,
        id: SubjectId,
        observation: &Observation,
        checked_at: DateTime<Utc>,
    ) -> Result<Committed, StoreError> {
        let mut g = self.lock();
        let fault = g.faults.get(&id).copied();

        let mut staged_subject = g
            .subjects
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("subject {id}")))?;

        if fault == Some(CommitFault::BeforeLogWrite) {
            return Err(injected(CommitFault::BeforeLogWrite, id));
        }
        let staged_log = observation.clone().into_log(id);

        if fault == Some(CommitFault::AfterLogWrite) {
            return Err(injected(CommitFault::AfterLogWrite, id));
        }
        staged_subject.last_checked = Some(checked_at);

        if fault == Some(CommitFault::AfterTimestampWrite) {
            return Err(injected(CommitFault::AfterTimestampWrite, id));
        }

        let previous = g.logs.insert(id, staged_log.clone());
        g.subjects.insert(id, staged_subject);
        g.commits += 1;
        Ok(Committed {
            previous,
            current: staged_log,
        })
    }
}

#[async_trait]
impl SubjectAdmin for InMemoryStore {
    async fn create_user(&self, new: &NewUser) -> Result<User, StoreError> {
        let mut g = self.lock();
        if g.users.values().any(|u| u.auth_id == new.auth_id) {
            return Err(StoreError::Conflict(format!("auth_id {} exists", new.auth_id)));
        }
        g.next_user_id += 1;
        let user = User {
            id: g.next_user_id,
            auth_id: new.auth_id.clone(),
            email: new.email.clone(),
            phone_number: new.phone_number.clone(),
            signup_date: Utc::now(),
        };
        g.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user_by_auth_id(&self, auth_id: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .lock()
            .users
            .values()
            .find(|u| u.auth_id == auth_id)
            .cloned())
    }

    async fn find_subject_by_puuid(&self, puuid: &str) -> Result<Option<Subject>, StoreError> {
        let g = self.lock();
        Ok(g
            .subjects
            .values()
            .find(|s| s.puuid == puuid)
            .map(|s| g.joined(s)))
    }

    async fn insert_subject(&self, new: &NewSubject) -> Result<Subject, StoreError> {
        if self.lock().subjects.values().any(|s| s.puuid == new.puuid) {
            return Err(StoreError::Conflict(format!("puuid {} is tracked", new.puuid)));
        }
        Ok(self.seed_subject(new.owner_id, &new.puuid, new.identity.clone(), true))
    }

    async fn toggle_active(&self, id: SubjectId) -> Result<Subject, StoreError> {
        let mut g = self.lock();
        let subject = g
            .subjects
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("subject {id}")))?;
        subject.active = !subject.active;
        let subject = subject.clone();
        Ok(g.joined(&subject))
    }

    async fn list_subjects(&self) -> Result<Vec<Subject>, StoreError> {
        let g = self.lock();
        Ok(g.subjects.values().map(|s| g.joined(s)).collect())
    }
}
