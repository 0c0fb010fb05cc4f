use crate::app::ListController;
use crate::app::event_loop::SelectionOp;

impl ListController {
    pub(crate) fn apply_selection(&mut self, op: SelectionOp) {
        let selection = &mut self.state.selection;
        match op {
            SelectionOp::Enter(id) | SelectionOp::Toggle(id)
                if !self.state.items.iter().any(|e| e.id == id) =>
            {
                tracing::debug!("Ignoring selection of unknown item {}", id);
                return;
            }
            SelectionOp::Enter(id) => selection.enter(&id),
            SelectionOp::Toggle(id) => selection.toggle(&id),
            SelectionOp::Exit => selection.exit(),
            SelectionOp::SelectAll => {
                selection.select_all(self.state.items.iter().map(|e| e.id.as_str()))
            }
            SelectionOp::DeselectAll => selection.deselect_all(),
        }
        self.dirty = true;
    }

    pub(crate) fn dismiss_error(&mut self) {
        if self.state.error.is_some() {
            self.state.clear_error();
            self.load_error = false;
            self.dirty = true;
        }
    }
}
