use crate::builder::TableBuilder;
use crate::class_table::ClassTable;
use crate::config::{CullConfig, DEFAULT_ENTRY_DESCRIPTOR};
use crate::Result;

pub const MAIN: &str = "app/Main";

pub fn entry_config() -> CullConfig {
    CullConfig::entry(MAIN, "main", DEFAULT_ENTRY_DESCRIPTOR)
}

/// `Main.main` calls `Used.work()`, builds a `Derived` and calls `speak` through `Base`.
/// `Other` overrides `speak` too but is never instantiated; `Unused` is never named.
pub fn shapes_table() -> Result<ClassTable> {
    let mut builder = TableBuilder::new();
    {
        let mut main = builder.class(MAIN);
        main.default_constructor()?;
        let mut m = main.static_method("main", DEFAULT_ENTRY_DESCRIPTOR);
        m.invoke_static("app/Used", "work", "()V")
            .construct("app/Derived")
            .invoke_virtual("app/Base", "speak", "()V")
            .return_void();
        m.build()?;
        main.build()?;
    }
    {
        let mut used = builder.class("app/Used");
        let mut m = used.static_method("work", "()V");
        m.return_void();
        m.build()?;
        used.build()?;
    }
    {
        let mut base = builder.class("app/Base");
        base.default_constructor()?;
        let mut m = base.method("speak", "()V");
        m.return_void();
        m.build()?;
        base.build()?;
    }
    for name in ["app/Derived", "app/Other"] {
        let mut class = builder.class(name);
        class.extends("app/Base").default_constructor()?;
        let mut m = class.method("speak", "()V");
        m.return_void();
        m.build()?;
        class.build()?;
    }
    {
        let mut unused = builder.class("app/Unused");
        unused.default_constructor()?;
        unused.build()?;
    }
    Ok(builder.finish())
}

/// A single class `app/Main` holding `main` plus whatever `body` adds as static methods.
pub fn single_class(
    body: impl FnOnce(&mut crate::builder::ClassBuilder<'_>) -> Result<()>,
) -> Result<ClassTable> {
    let mut builder = TableBuilder::new();
    {
        let mut main = builder.class(MAIN);
        let mut m = main.static_method("main", DEFAULT_ENTRY_DESCRIPTOR);
        m.return_void();
        m.build()?;
        body(&mut main)?;
        main.build()?;
    }
    Ok(builder.finish())
}
