use parking_lot::Mutex;

/// One request to show a conversation. Only the most recent request whose
/// conversation is still selected may touch the rendered view.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadRequest {
    pub request_id: u64,
    pub conversation_id: String,
}

#[derive(Default)]
struct SelectionState {
    latest_request_id: u64,
    selected: Option<String>,
}

/// The conversation currently selected in the UI, plus the fencing counter for
/// conversation loads. Shared by the switch coordinator (writer) and the stream
/// controller (reader).
#[derive(Default)]
pub struct ConversationSelection {
    state: Mutex<SelectionState>,
}

impl ConversationSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select a conversation and allocate the next request id in one step.
    pub fn select(&self, conversation_id: &str) -> LoadRequest {
        self.select_with(conversation_id, |_| {})
    }

    /// Like [`select`](Self::select), running `announce` before the selection
    /// lock is released. Anything `announce` publishes is ordered before any
    /// output of a later selection.
    pub fn select_with<F>(&self, conversation_id: &str, announce: F) -> LoadRequest
    where
        F: FnOnce(&LoadRequest),
    {
        let mut state = self.state.lock();
        state.latest_request_id += 1;
        state.selected = Some(conversation_id.to_string());
        let request = LoadRequest {
            request_id: state.latest_request_id,
            conversation_id: conversation_id.to_string(),
        };
        announce(&request);
        request
    }

    /// Whether a completed load may still mutate the view.
    pub fn is_current(&self, request: &LoadRequest) -> bool {
        let state = self.state.lock();
        Self::matches(&state, request)
    }

    /// Run `apply` only if `request` is still current. The selection cannot
    /// change while `apply` runs.
    pub fn apply_if_current<T, F>(&self, request: &LoadRequest, apply: F) -> Option<T>
    where
        F: FnOnce() -> T,
    {
        let state = self.state.lock();
        Self::matches(&state, request).then(apply)
    }

    /// Run `f` only while `conversation_id` is the selected conversation.
    pub fn with_selected<T, F>(&self, conversation_id: &str, f: F) -> Option<T>
    where
        F: FnOnce() -> T,
    {
        let state = self.state.lock();
        (state.selected.as_deref() == Some(conversation_id)).then(f)
    }

    fn matches(state: &SelectionState, request: &LoadRequest) -> bool {
        state.latest_request_id == request.request_id
            && state.selected.as_deref() == Some(request.conversation_id.as_str())
    }

    pub fn selected(&self) -> Option<String> {
        self.state.lock().selected.clone()
    }
}
