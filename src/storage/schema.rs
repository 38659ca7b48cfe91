pub const STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS customer (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        telegram_id INTEGER NOT NULL UNIQUE,
        language TEXT NOT NULL DEFAULT 'en',
        subscription_link TEXT,
        expire_at TEXT,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS purchase (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        customer_id INTEGER NOT NULL REFERENCES customer(id),
        invoice_kind TEXT NOT NULL,
        status TEXT NOT NULL,
        amount REAL NOT NULL,
        currency TEXT NOT NULL,
        months INTEGER NOT NULL,
        external_id TEXT,
        payment_url TEXT,
        auto_renew INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        paid_at TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_purchase_external ON purchase(invoice_kind, external_id)",
    "CREATE INDEX IF NOT EXISTS idx_purchase_customer ON purchase(customer_id, invoice_kind)",
    "CREATE TABLE IF NOT EXISTS subscription (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        customer_id INTEGER NOT NULL REFERENCES customer(id),
        sequence INTEGER NOT NULL,
        link TEXT NOT NULL,
        expire_at TEXT NOT NULL,
        name TEXT NOT NULL,
        description TEXT NOT NULL,
        is_active INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_subscription_customer ON subscription(customer_id, is_active)",
    "CREATE TABLE IF NOT EXISTS referral (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        referrer_telegram_id INTEGER NOT NULL,
        referee_telegram_id INTEGER NOT NULL UNIQUE,
        bonus_granted INTEGER NOT NULL DEFAULT 0,
        used_at TEXT NOT NULL
    )",
];
