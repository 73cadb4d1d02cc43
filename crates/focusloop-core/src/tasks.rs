//! Task service: CRUD over the current user's tasks, with an observable
//! task list and a debounced sync trigger after every mutation.

use std::sync::Arc;

use tokio::sync::watch;
use uuid::Uuid;

use crate::bus::Publisher;
use crate::error::TaskError;
use crate::model::Task;
use crate::profile::ProfileService;
use crate::store::{Database, NewTask, TaskUpdate};
use crate::sync::SyncHandle;

/// Manages tasks for the signed-in user.
pub struct TaskService {
    db: Arc<Database>,
    profiles: Arc<ProfileService>,
    sync: SyncHandle,
    tasks: Publisher<Vec<Task>>,
}

impl TaskService {
    pub fn new(db: Arc<Database>, profiles: Arc<ProfileService>, sync: SyncHandle) -> Arc<Self> {
        Arc::new(Self {
            db,
            profiles,
            sync,
            tasks: Publisher::new(Vec::new()),
        })
    }

    /// Observe the task list; replays the current value on subscribe.
    pub fn subscribe_tasks(&self) -> watch::Receiver<Vec<Task>> {
        self.tasks.subscribe()
    }

    /// Snapshot of the published task list.
    pub fn tasks(&self) -> Vec<Task> {
        self.tasks.get()
    }

    /// Create a task for the current user. Order is assigned as max+1.
    pub fn create_task(&self, new: &NewTask) -> Result<Task, TaskError> {
        let user = self
            .profiles
            .current_user()
            .ok_or(TaskError::NotAuthenticated)?;
        let task = self.db.create_task(user.id, new)?;
        self.sync.notify_local_change();
        self.refresh_tasks()?;
        Ok(task)
    }

    /// Partial update; only supplied fields change.
    pub fn update_task(&self, id: Uuid, update: &TaskUpdate) -> Result<Task, TaskError> {
        let task = self
            .db
            .update_task(id, update)?
            .ok_or(TaskError::TaskNotFound)?;
        self.sync.notify_local_change();
        self.refresh_tasks()?;
        Ok(task)
    }

    pub fn complete_task(&self, id: Uuid) -> Result<Task, TaskError> {
        let task = self.db.complete_task(id)?.ok_or(TaskError::TaskNotFound)?;
        self.sync.notify_local_change();
        self.refresh_tasks()?;
        Ok(task)
    }

    pub fn delete_task(&self, id: Uuid) -> Result<(), TaskError> {
        if !self.db.delete_task(id)? {
            return Err(TaskError::TaskNotFound);
        }
        self.sync.notify_local_change();
        self.refresh_tasks()?;
        Ok(())
    }

    pub fn fetch_task(&self, id: Uuid) -> Result<Option<Task>, TaskError> {
        Ok(self.db.fetch_task(id)?)
    }

    /// Re-read and publish the task list, honoring the user's
    /// show-completed preference. Without a user this publishes empty.
    pub fn refresh_tasks(&self) -> Result<Vec<Task>, TaskError> {
        let Some(user) = self.profiles.current_user() else {
            self.tasks.publish(Vec::new());
            return Ok(Vec::new());
        };
        let include_completed = self
            .db
            .fetch_settings(user.id)?
            .map(|s| s.show_completed_tasks)
            .unwrap_or(false);
        let tasks = self.db.fetch_tasks(user.id, include_completed)?;
        self.tasks.publish(tasks.clone());
        Ok(tasks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthSession;
    use crate::model::Identity;
    use crate::store::SettingsUpdate;

    fn services() -> (Arc<TaskService>, Arc<ProfileService>) {
        let db = Arc::new(Database::open_memory().unwrap());
        let auth = Arc::new(AuthSession::new());
        let profiles = ProfileService::new(
            Arc::clone(&db),
            Arc::clone(&auth),
            SyncHandle::disconnected(),
        );
        auth.sign_in(Identity {
            uid: "auth-1".to_string(),
            display_name: "Ada".to_string(),
            phone_number: "+15550100".to_string(),
            email: None,
        });
        profiles.refresh_current_user().unwrap();
        let tasks = TaskService::new(db, Arc::clone(&profiles), SyncHandle::disconnected());
        (tasks, profiles)
    }

    #[tokio::test]
    async fn create_requires_user() {
        let db = Arc::new(Database::open_memory().unwrap());
        let auth = Arc::new(AuthSession::new());
        let profiles = ProfileService::new(
            Arc::clone(&db),
            Arc::clone(&auth),
            SyncHandle::disconnected(),
        );
        let tasks = TaskService::new(db, profiles, SyncHandle::disconnected());
        let err = tasks
            .create_task(&NewTask {
                title: "x".to_string(),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, TaskError::NotAuthenticated));
    }

    #[tokio::test]
    async fn create_publishes_task_list() {
        let (tasks, _profiles) = services();
        tasks
            .create_task(&NewTask {
                title: "write".to_string(),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(tasks.tasks().len(), 1);
        assert_eq!(tasks.tasks()[0].title, "write");
    }

    #[tokio::test]
    async fn completed_tasks_hidden_unless_preference_set() {
        let (tasks, profiles) = services();
        let task = tasks
            .create_task(&NewTask {
                title: "done soon".to_string(),
                ..Default::default()
            })
            .unwrap();
        tasks.complete_task(task.id).unwrap();
        assert!(tasks.tasks().is_empty());

        profiles
            .update_settings(&SettingsUpdate {
                show_completed_tasks: Some(true),
                ..Default::default()
            })
            .unwrap();
        tasks.refresh_tasks().unwrap();
        assert_eq!(tasks.tasks().len(), 1);
    }

    #[tokio::test]
    async fn unknown_task_operations_fail() {
        let (tasks, _profiles) = services();
        let missing = Uuid::new_v4();
        assert!(matches!(
            tasks.complete_task(missing).unwrap_err(),
            TaskError::TaskNotFound
        ));
        assert!(matches!(
            tasks.delete_task(missing).unwrap_err(),
            TaskError::TaskNotFound
        ));
        assert!(matches!(
            tasks.update_task(missing, &TaskUpdate::default()).unwrap_err(),
            TaskError::TaskNotFound
        ));
    }
}
