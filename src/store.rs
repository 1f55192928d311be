use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::gateway::{Gateway, TodoOrder};
use crate::models::{NewTodo, Todo, UserSession};

/// The todo collection backing a single view.
///
/// Each view builds its own store when it loads; stores are never shared.
/// Mutations go to the gateway first and only touch local state once the
/// backend has answered, using the row the backend returned.
pub struct TodoStore {
    gateway: Arc<dyn Gateway>,
    session: Option<UserSession>,
    todos: Vec<Todo>,
}

impl TodoStore {
    /// Fetches the signed-in user's todos. Without a session the store is
    /// empty and nothing is requested.
    pub async fn load(
        gateway: Arc<dyn Gateway>,
        session: Option<UserSession>,
        order: TodoOrder,
    ) -> Result<Self, AppError> {
        let todos = match &session {
            Some(session) => {
                let fetched = gateway
                    .list_todos(&session.access_token, session.user.id, order)
                    .await?;
                let total = fetched.len();
                let owned: Vec<Todo> = fetched
                    .into_iter()
                    .filter(|todo| todo.user_id == session.user.id)
                    .collect();
                if owned.len() != total {
                    warn!(
                        dropped = total - owned.len(),
                        "backend returned todos owned by another user"
                    );
                }
                owned
            }
            None => Vec::new(),
        };

        Ok(Self {
            gateway,
            session,
            todos,
        })
    }

    pub fn todos(&self) -> &[Todo] {
        &self.todos
    }

    pub fn into_todos(self) -> Vec<Todo> {
        self.todos
    }

    pub fn pending(&self) -> impl Iterator<Item = &Todo> {
        self.todos.iter().filter(|todo| !todo.completed)
    }

    pub fn completed(&self) -> impl Iterator<Item = &Todo> {
        self.todos.iter().filter(|todo| todo.completed)
    }

    pub fn get(&self, id: Uuid) -> Option<&Todo> {
        self.todos.iter().find(|todo| todo.id == id)
    }

    fn session(&self) -> Result<&UserSession, AppError> {
        self.session.as_ref().ok_or(AppError::AuthRequired)
    }

    pub async fn insert(&mut self, text: &str) -> Result<&Todo, AppError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::Validation("Todo text cannot be empty".to_string()));
        }
        let session = self.session()?;

        let new = NewTodo {
            user_id: session.user.id,
            text: text.to_string(),
            completed: false,
        };
        let todo = self.gateway.insert_todo(&session.access_token, &new).await?;
        info!(id = %todo.id, user_id = %todo.user_id, "Created todo");

        self.todos.push(todo);
        Ok(&self.todos[self.todos.len() - 1])
    }

    /// Flips `completed`. The local row is replaced by whatever the backend
    /// stored, so concurrent toggles converge on the server's value.
    pub async fn toggle_completion(&mut self, id: Uuid) -> Result<&Todo, AppError> {
        let session = self.session()?;
        let index = self
            .todos
            .iter()
            .position(|todo| todo.id == id)
            .ok_or(AppError::NotFound)?;
        let requested = !self.todos[index].completed;

        let stored = self
            .gateway
            .update_todo(&session.access_token, id, session.user.id, requested)
            .await?;
        info!(id = %stored.id, completed = stored.completed, "Updated todo");

        self.todos[index] = stored;
        Ok(&self.todos[index])
    }

    /// Deletes only when the user confirmed; the request is scoped to the
    /// session's user so a guessed id cannot reach someone else's row.
    pub async fn delete(&mut self, id: Uuid, confirmed: bool) -> Result<Todo, AppError> {
        if !confirmed {
            return Err(AppError::ConfirmationRequired);
        }
        let session = self.session()?;
        let index = self
            .todos
            .iter()
            .position(|todo| todo.id == id)
            .ok_or(AppError::NotFound)?;

        self.gateway
            .delete_todo(&session.access_token, id, session.user.id)
            .await?;
        info!(id = %id, "Deleted todo");

        Ok(self.todos.remove(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::LocalGateway;

    async fn signed_in() -> (Arc<LocalGateway>, UserSession) {
        let local = Arc::new(LocalGateway::open_in_memory().unwrap().with_auto_confirm(true));
        local.sign_up("user@example.com", "secret1").await.unwrap();
        let session = local.sign_in("user@example.com", "secret1").await.unwrap();
        (
            local,
            UserSession {
                user: session.user,
                access_token: session.access_token,
            },
        )
    }

    async fn store(local: &Arc<LocalGateway>, session: &UserSession) -> TodoStore {
        TodoStore::load(local.clone(), Some(session.clone()), TodoOrder::Unspecified)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn insert_then_list_contains_one_new_pending_todo() {
        let (local, session) = signed_in().await;
        let mut todos = store(&local, &session).await;
        todos.insert("  Buy milk ").await.unwrap();

        let reloaded = store(&local, &session).await;
        let matching: Vec<_> = reloaded
            .todos()
            .iter()
            .filter(|t| t.text == "Buy milk")
            .collect();
        assert_eq!(matching.len(), 1);
        assert!(!matching[0].completed);
        assert_eq!(reloaded.pending().count(), 1);
        assert_eq!(reloaded.completed().count(), 0);
    }

    #[tokio::test]
    async fn blank_text_never_reaches_the_backend() {
        let (local, session) = signed_in().await;
        let mut todos = store(&local, &session).await;
        assert!(matches!(todos.insert("   ").await, Err(AppError::Validation(_))));
        assert!(store(&local, &session).await.todos().is_empty());
    }

    #[tokio::test]
    async fn insert_without_session_requires_auth() {
        let local = Arc::new(LocalGateway::open_in_memory().unwrap());
        let mut todos = TodoStore::load(local, None, TodoOrder::Unspecified).await.unwrap();
        assert!(todos.todos().is_empty());
        assert!(matches!(todos.insert("Buy milk").await, Err(AppError::AuthRequired)));
    }

    #[tokio::test]
    async fn toggle_twice_restores_original_state() {
        let (local, session) = signed_in().await;
        let mut todos = store(&local, &session).await;
        let id = todos.insert("Buy milk").await.unwrap().id;

        assert!(todos.toggle_completion(id).await.unwrap().completed);
        assert_eq!(todos.completed().count(), 1);
        assert!(!todos.toggle_completion(id).await.unwrap().completed);
        assert_eq!(todos.pending().count(), 1);
    }

    #[tokio::test]
    async fn toggle_adopts_the_server_row() {
        let (local, session) = signed_in().await;
        let mut first = store(&local, &session).await;
        let id = first.insert("Buy milk").await.unwrap().id;

        // A second view of the same data toggles first; the stale view then
        // asks for `true` again and ends up agreeing with the server.
        let mut second = store(&local, &session).await;
        second.toggle_completion(id).await.unwrap();
        let after = first.toggle_completion(id).await.unwrap();
        assert!(after.completed);
        let server = store(&local, &session).await;
        assert_eq!(server.get(id).unwrap().completed, after.completed);
    }

    #[tokio::test]
    async fn toggle_unknown_id_is_not_found() {
        let (local, session) = signed_in().await;
        let mut todos = store(&local, &session).await;
        assert!(matches!(
            todos.toggle_completion(Uuid::new_v4()).await,
            Err(AppError::NotFound)
        ));
    }

    #[tokio::test]
    async fn delete_requires_confirmation() {
        let (local, session) = signed_in().await;
        let mut todos = store(&local, &session).await;
        let id = todos.insert("Buy milk").await.unwrap().id;

        assert!(matches!(
            todos.delete(id, false).await,
            Err(AppError::ConfirmationRequired)
        ));
        assert_eq!(store(&local, &session).await.todos().len(), 1);

        let removed = todos.delete(id, true).await.unwrap();
        assert_eq!(removed.text, "Buy milk");
        assert!(todos.todos().is_empty());
        assert!(store(&local, &session).await.todos().is_empty());
    }

    #[tokio::test]
    async fn failed_mutation_leaves_local_state_alone() {
        let (local, session) = signed_in().await;
        let mut todos = store(&local, &session).await;
        let id = todos.insert("Buy milk").await.unwrap().id;

        local.sign_out(&session.access_token).await.unwrap();
        assert!(matches!(todos.toggle_completion(id).await, Err(AppError::Auth(_))));
        assert!(!todos.get(id).unwrap().completed);
        assert!(matches!(todos.delete(id, true).await, Err(AppError::Auth(_))));
        assert_eq!(todos.todos().len(), 1);
    }
}
