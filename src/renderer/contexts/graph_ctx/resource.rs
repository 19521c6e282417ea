use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};
use color_eyre::eyre::eyre;
use color_eyre::Result;
use crate::renderer::resources::buffer::Buffer;
use crate::renderer::resources::texture::Texture;

static RESOURCE_ID_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Index into a [`ResourceTable`]. Typed so texture and buffer handles cannot be mixed up.
pub struct Handle<T> {
    index: u32,
    _marker: PhantomData<fn() -> T>,
}

pub type TextureHandle = Handle<Texture>;
pub type BufferHandle = Handle<Buffer>;

impl<T> Handle<T> {
    pub const NULL: Self = Self::new(u32::MAX);

    const fn new(index: u32) -> Self {
        Self {
            index,
            _marker: PhantomData,
        }
    }

    pub fn is_null(&self) -> bool {
        self.index == u32::MAX
    }

    pub fn index(&self) -> usize {
        self.index as usize
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "Handle(null)")
        } else {
            write!(f, "Handle({})", self.index)
        }
    }
}

/// First and last pass indices touching a resource, recomputed on every build
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResourceAccess {
    pub first_read: Option<usize>,
    pub first_write: Option<usize>,
    pub last_read: Option<usize>,
    pub last_write: Option<usize>,
}

/// A logical resource backed by one or more slices
#[derive(Clone, Debug)]
pub struct Resource<T> {
    id: usize,
    pub name: String,
    /// Content is not preserved across frames and never committed by the caller
    pub transient: bool,
    /// Owned by a collaborator such as the swapchain rather than the graph
    pub external: bool,
    slices: Vec<T>,
    pub access: ResourceAccess,
}

impl<T> Resource<T> {
    pub fn new(name: &str, transient: bool) -> Self {
        Self {
            id: RESOURCE_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
            name: name.to_owned(),
            transient,
            external: false,
            slices: Vec::new(),
            access: ResourceAccess::default(),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn with_slices(mut self, slices: Vec<T>) -> Self {
        self.slices = slices;
        self
    }

    /// The slice count can be set once; afterwards only the slices' contents may change
    pub fn set_slices(&mut self, slices: Vec<T>) -> Result<()> {
        if !self.slices.is_empty() {
            return Err(eyre!(
                "Resource \"{}\" already has {} slices",
                self.name,
                self.slices.len()
            ));
        }
        self.slices = slices;
        Ok(())
    }

    pub fn slice_count(&self) -> usize {
        self.slices.len()
    }

    /// Slice `index` modulo the slice count, so a frame counter can be passed directly
    pub fn slice(&self, index: usize) -> Option<&T> {
        if self.slices.is_empty() {
            return None;
        }
        self.slices.get(index % self.slices.len())
    }

    pub fn slice_mut(&mut self, index: usize) -> Option<&mut T> {
        if self.slices.is_empty() {
            return None;
        }
        let len = self.slices.len();
        self.slices.get_mut(index % len)
    }

    pub fn slices(&self) -> &[T] {
        &self.slices
    }

    pub fn slices_mut(&mut self) -> &mut [T] {
        &mut self.slices
    }
}

/// Arena of logical resources addressed by [`Handle`]
pub struct ResourceTable<T> {
    resources: Vec<Resource<T>>,
}

impl<T> Default for ResourceTable<T> {
    fn default() -> Self {
        Self {
            resources: Vec::new(),
        }
    }
}

impl<T> ResourceTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, name: &str, transient: bool) -> Handle<T> {
        self.push(Resource::new(name, transient))
    }

    /// Registers a collaborator-owned resource, returning the existing handle if it is already known
    pub fn add_external(&mut self, mut resource: Resource<T>) -> Handle<T> {
        let handle = self.handle_of(&resource);
        if !handle.is_null() {
            return handle;
        }
        resource.external = true;
        self.push(resource)
    }

    pub fn handle_of(&self, resource: &Resource<T>) -> Handle<T> {
        self.resources
            .iter()
            .position(|r| r.id == resource.id)
            .map(|i| Handle::new(i as u32))
            .unwrap_or(Handle::NULL)
    }

    pub fn get(&self, handle: Handle<T>) -> Option<&Resource<T>> {
        self.resources.get(handle.index())
    }

    pub fn get_mut(&mut self, handle: Handle<T>) -> Option<&mut Resource<T>> {
        self.resources.get_mut(handle.index())
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &Resource<T>)> {
        self.resources
            .iter()
            .enumerate()
            .map(|(i, r)| (Handle::new(i as u32), r))
    }

    pub fn reset_access(&mut self) {
        for resource in self.resources.iter_mut() {
            resource.access = ResourceAccess::default();
        }
    }

    fn push(&mut self, resource: Resource<T>) -> Handle<T> {
        self.resources.push(resource);
        Handle::new((self.resources.len() - 1) as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unregistered_resource_has_null_handle() {
        let table = ResourceTable::<Texture>::new();
        let stranger = Resource::<Texture>::new("stranger", false);

        assert!(table.handle_of(&stranger).is_null());
        assert!(table.get(Handle::NULL).is_none());
    }

    #[test]
    fn test_add_external_twice_returns_same_handle() {
        let mut table = ResourceTable::<Texture>::new();
        let _ = table.create("offscreen", true);
        let back_buffer = Resource::new("back buffer", false)
            .with_slices(vec![Texture::default(); 3]);

        let first = table.add_external(back_buffer.clone());
        let second = table.add_external(back_buffer.clone());

        assert_eq!(first, second);
        assert_eq!(table.len(), 2);
        assert!(table.get(first).is_some_and(|r| r.external));
        assert_eq!(table.handle_of(&back_buffer), first);
    }

    #[test]
    fn test_handles_are_not_reused() {
        let mut table = ResourceTable::<Buffer>::new();
        let a = table.create("a", false);
        let b = table.create("a", false);

        assert_ne!(a, b);
        assert_ne!(table.get(a).map(|r| r.id()), table.get(b).map(|r| r.id()));
    }

    #[test]
    fn test_slice_index_wraps() {
        let mut resource = Resource::new("uniforms", false);
        resource
            .set_slices(vec![Buffer::new(16, Default::default()), Buffer::new(32, Default::default())])
            .unwrap();

        assert_eq!(resource.slice(0).map(|b| b.size), Some(16));
        assert_eq!(resource.slice(3).map(|b| b.size), Some(32));
        assert!(resource.set_slices(vec![Buffer::default()]).is_err());
        assert_eq!(resource.slice_count(), 2);
    }

    #[test]
    fn test_sliceless_resource_has_no_slice() {
        let resource = Resource::<Texture>::new("empty", true);
        assert!(resource.slice(0).is_none());
    }
}
