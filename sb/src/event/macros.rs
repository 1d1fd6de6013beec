//! Declaration macros for events and event maps

/// Declare a broadcast event
///
/// The shape is normalized through [`Funcify`](crate::event::Funcify), so both
/// `fn(A, B)` and `Payload<T>` are accepted.
#[macro_export]
macro_rules! define_event {
    ($(#[$meta:meta])* $vis:vis $name:ident = $key:literal : $shape:ty) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
        $vis struct $name;

        impl $crate::event::Event for $name {
            const NAME: &'static str = $key;
            type Shape = $crate::event::Funcified<$shape>;
        }
    };
}

/// Declare a request/response event; the result type defaults to `()`
#[macro_export]
macro_rules! define_request {
    ($(#[$meta:meta])* $vis:vis $name:ident = $key:literal : fn($($arg:ty),* $(,)?) -> $out:ty) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
        $vis struct $name;

        impl $crate::event::Event for $name {
            const NAME: &'static str = $key;
            type Shape = fn($($arg),*);

            fn shape() -> $crate::schema::HandlerShape {
                $crate::schema::HandlerShape::new(
                    <$crate::event::ArgsOf<Self> as $crate::event::Args>::params(),
                )
                .with_returns(<$out as $crate::schema::Param>::param_type())
            }
        }

        impl $crate::event::Request for $name {
            type Output = $out;
        }
    };
    ($(#[$meta:meta])* $vis:vis $name:ident = $key:literal : fn($($arg:ty),* $(,)?)) => {
        $crate::define_request!($(#[$meta])* $vis $name = $key: fn($($arg),*) -> ());
    };
}

/// Declare an event map, either over existing event types or inline
#[macro_export]
macro_rules! event_map {
    ($(#[$meta:meta])* $vis:vis $name:ident { $($event:ident = $key:literal : $shape:ty),+ $(,)? }) => {
        $(
            $crate::define_event!($vis $event = $key: $shape);
        )+
        $crate::event_map!($(#[$meta])* $vis $name { $($event),+ });
    };
    ($(#[$meta:meta])* $vis:vis $name:ident { $($event:ty),* $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
        $vis struct $name;

        impl $crate::event::EventMap for $name {
            const NAME: &'static str = stringify!($name);

            #[allow(unused_variables)]
            fn describe(builder: &mut $crate::schema::SchemaBuilder) {
                $(
                    builder.event::<$event>();
                )*
            }
        }

        $(
            impl $crate::event::Has<$event> for $name {}
        )*
    };
}
