// Copyright (c) 2023 The TQUIC Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Observable values for introspection of controller internals.

use std::fmt;

/// Callback invoked with the old and the new value of a traced variable.
pub type TraceCallback<T> = Box<dyn FnMut(T, T) + Send>;

/// A value which notifies its subscribers whenever it changes.
///
/// Only the owner can write the value. Cloning copies the value but not the
/// subscribers, so a clone starts with nobody listening.
pub struct TracedValue<T> {
    value: T,
    callbacks: Vec<TraceCallback<T>>,
}

impl<T: Copy + PartialEq> TracedValue<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            callbacks: Vec::new(),
        }
    }

    /// Return the current value.
    pub fn get(&self) -> T {
        self.value
    }

    /// Update the value, notifying subscribers if it actually changed.
    pub fn set(&mut self, value: T) {
        if self.value == value {
            return;
        }

        let old = self.value;
        self.value = value;
        for cb in self.callbacks.iter_mut() {
            cb(old, value);
        }
    }

    /// Subscribe to value changes.
    pub fn connect(&mut self, cb: TraceCallback<T>) {
        self.callbacks.push(cb);
    }

    /// Number of subscribers.
    pub fn subscribers(&self) -> usize {
        self.callbacks.len()
    }
}

impl<T: Copy> Clone for TracedValue<T> {
    fn clone(&self) -> Self {
        Self {
            value: self.value,
            callbacks: Vec::new(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for TracedValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::Mutex;

    #[test]
    fn traced_value_notify() {
        let changes = Arc::new(Mutex::new(Vec::new()));
        let mut v = TracedValue::new(0_u64);

        let c = changes.clone();
        v.connect(Box::new(move |old, new| c.lock().unwrap().push((old, new))));
        assert_eq!(v.subscribers(), 1);

        v.set(10);
        v.set(10);
        v.set(20);
        assert_eq!(v.get(), 20);
        assert_eq!(*changes.lock().unwrap(), vec![(0, 10), (10, 20)]);
    }

    #[test]
    fn traced_value_clone() {
        let hits = Arc::new(Mutex::new(0));
        let mut v = TracedValue::new(1.5_f64);

        let h = hits.clone();
        v.connect(Box::new(move |_, _| *h.lock().unwrap() += 1));

        let mut w = v.clone();
        assert_eq!(w.get(), 1.5);
        assert_eq!(w.subscribers(), 0);

        w.set(3.0);
        assert_eq!(v.get(), 1.5);
        assert_eq!(*hits.lock().unwrap(), 0);

        v.set(2.0);
        assert_eq!(*hits.lock().unwrap(), 1);
        assert_eq!(format!("{:?}", v), "2.0");
    }
}
