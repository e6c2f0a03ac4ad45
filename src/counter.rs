use crate::error::RenderError;
use num_traits::{CheckedAdd, One};

/// Hands out monotonically increasing IDs and refuses to wrap around.
#[derive(Debug)]
pub(crate) struct IdCounter<T> {
	next: Option<T>,
	what: &'static str,
}
impl<T> IdCounter<T>
where
	T: Copy + CheckedAdd + One,
{
	pub fn starting_at(first: T, what: &'static str) -> Self {
		Self { next: Some(first), what }
	}

	pub fn next(&mut self) -> Result<T, RenderError> {
		let id = self.next.ok_or(RenderError::IdSpaceExhausted(self.what))?;
		self.next = id.checked_add(&T::one());
		Ok(id)
	}
}

impl<T: Copy + PartialOrd> IdCounter<T> {
	/// Whether `id` has been handed out already.
	pub fn issued(&self, id: T) -> bool {
		self.next.map_or(true, |next| id < next)
	}
}
